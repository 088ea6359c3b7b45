//! ## Command
//!
//! Builders for the opcoded requests. Every check happens here, before any byte reaches the
//! transport.
//!

use crate::communication::codec::{integer_to_bytes, voltage_to_bytes};
use crate::communication::nibble::{fix_ps_bytes, split_bytes};
use crate::constants::opcodes::*;
use crate::constants::power_supply::*;
use crate::constants::waveform::*;
use crate::error::Error;
use crate::types::Range;

use anyhow::Result;

fn check_ps_voltage(ps_voltage: f64) -> Result<()> {
    if !(POWERSUPPLY_MIN..=POWERSUPPLY_MAX).contains(&ps_voltage) {
        return Err(Error::ValueOutOfRange(format!(
            "power supply voltage {ps_voltage} V is outside {POWERSUPPLY_MIN}-{POWERSUPPLY_MAX} V"
        ))
        .into());
    }
    Ok(())
}

/// The firmware takes the power supply set point in whole volts
fn ps_code(ps_voltage: f64) -> Result<Vec<u8>> {
    check_ps_voltage(ps_voltage)?;
    integer_to_bytes(ps_voltage.trunc() as u64, POWERSUPPLY_BITS)
}

/// ### Program Request
///
/// `OP_PROGRAM` followed by the nibble split payload:
///
/// | Field         | Encoding                           | Bytes |
/// |---------------|------------------------------------|-------|
/// | ps voltage    | 10 bit integer                     | 2     |
/// | frequency     | 24 bit integer                     | 3     |
/// | waveform x 8  | 12 bit bipolar code, +/-10 V       | 16    |
/// | range         | range wire code                    | 1     |
///
pub fn program_request(
    ps_voltage: f64,
    frequency: u32,
    waveform: &[f64],
    range: Range,
) -> Result<Vec<u8>> {
    if waveform.len() != WAVEFORM_SAMPLES_PER_PERIOD {
        return Err(Error::ValueOutOfRange(format!(
            "waveform table has {} samples, expected {WAVEFORM_SAMPLES_PER_PERIOD}",
            waveform.len()
        ))
        .into());
    }

    let mut payload = ps_code(ps_voltage)?;
    payload.extend(integer_to_bytes(frequency as u64, FREQUENCY_BITS)?);
    for sample in waveform {
        payload.extend(voltage_to_bytes(*sample, WAVEFORM_VREF, WAVEFORM_BITS, true)?);
    }
    payload.push(range.code());

    let mut request = vec![OP_PROGRAM];
    request.extend(split_bytes(&payload));
    Ok(request)
}

/// ### Set Power Supply Request
///
/// `OP_SET_PS` and the 10 bit set point passed through [`fix_ps_bytes`]. Not nibble split.
///
pub fn set_ps_request(ps_voltage: f64) -> Result<Vec<u8>> {
    let code = ps_code(ps_voltage)?;
    let [ms, ls] = fix_ps_bytes([code[0], code[1]]);
    Ok(vec![OP_SET_PS, ms, ls])
}

pub fn set_range_request(range: Range) -> Vec<u8> {
    vec![OP_SET_RANGE, range.code()]
}

pub fn echo_request(opcode: u8, pattern: u8) -> Vec<u8> {
    vec![opcode, pattern]
}
