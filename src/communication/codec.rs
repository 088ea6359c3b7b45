//! ## Codec
//!
//! Fixed point conversion between voltages and the big endian codes used by the converters.
//!
//! - Unipolar: `Vout = Vref * D / 2^n`
//! - Bipolar: `Vout = Vref * D / 2^(n-1) - Vref`
//!

use crate::error::Error;

use anyhow::Result;

const MAX_BITS: u32 = 32;

/// Number of whole bytes needed to hold `bits` bits
pub fn byte_length(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

fn check_bits(bits: u32) -> Result<()> {
    if bits == 0 || bits > MAX_BITS {
        return Err(Error::ValueOutOfRange(format!("code width of {bits} bits")).into());
    }
    Ok(())
}

/// ### Integer to Bytes
///
/// Pack `value` into `ceil(bits / 8)` big endian bytes. Fails when the value needs more than
/// `bits` bits.
///
pub fn integer_to_bytes(value: u64, bits: u32) -> Result<Vec<u8>> {
    check_bits(bits)?;
    if value >> bits != 0 {
        return Err(Error::ValueOutOfRange(format!("{value} does not fit in {bits} bits")).into());
    }

    let length = byte_length(bits);
    Ok(value.to_be_bytes()[8 - length..].to_vec())
}

/// ### Bytes to Integer
///
/// Unpack a big endian code of `bits` bits.
///
pub fn bytes_to_integer(bytes: &[u8], bits: u32) -> Result<u64> {
    check_bits(bits)?;
    let length = byte_length(bits);
    if bytes.len() != length {
        return Err(Error::Length {
            expected: length,
            actual: bytes.len(),
        }
        .into());
    }

    let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    if value >> bits != 0 {
        return Err(Error::ValueOutOfRange(format!("{value:#x} is wider than {bits} bits")).into());
    }

    Ok(value)
}

/// ### Voltage to Bytes
///
/// Convert a voltage into the code a converter with reference `vref` and `bits` bits would
/// produce. Full scale rounds to `2^n` which is clamped to `2^n - 1`.
///
pub fn voltage_to_bytes(v: f64, vref: f64, bits: u32, bipolar: bool) -> Result<Vec<u8>> {
    check_bits(bits)?;
    if !v.is_finite() || vref <= 0.0 {
        return Err(Error::ValueOutOfRange(format!("{v} V against a {vref} V reference")).into());
    }

    let full_scale = (1u64 << bits) as f64;
    let code = if bipolar {
        if v.abs() > vref {
            return Err(Error::ValueOutOfRange(format!("{v} V is outside +/-{vref} V")).into());
        }
        (full_scale / 2.0 * (v / vref + 1.0)).round()
    } else {
        if !(0.0..=vref).contains(&v) {
            return Err(Error::ValueOutOfRange(format!("{v} V is outside 0-{vref} V")).into());
        }
        (full_scale * v / vref).round()
    };

    let mut code = code as u64;
    // prevent binary overflow at full scale
    if code == 1u64 << bits {
        code -= 1;
    }

    integer_to_bytes(code, bits)
}

/// ### Bytes to Voltage
///
/// Inverse of [`voltage_to_bytes`]. Quantization error of up to one LSB is not corrected.
///
pub fn bytes_to_voltage(bytes: &[u8], vref: f64, bits: u32, bipolar: bool) -> Result<f64> {
    let code = bytes_to_integer(bytes, bits)? as f64;

    let voltage = if bipolar {
        vref * code / (1u64 << (bits - 1)) as f64 - vref
    } else {
        vref * code / (1u64 << bits) as f64
    };

    Ok(voltage)
}
