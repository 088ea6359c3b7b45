//! ## Measurement
//!
//! Decoding of the capture block returned after `OP_TRIGGER_MEASUREMENT`.
//!
//! After recombining the nibbles the block holds, in order:
//! - 24 function generator samples, 12 bit bipolar against 2.5 V
//! - 24 DUT samples, 12 bit bipolar against 1 V, before range scaling
//! - the power supply feedback, 12 bit unipolar against 60 V
//!

use crate::communication::codec::bytes_to_voltage;
use crate::communication::nibble::combine_bytes;
use crate::constants::measurement::*;
use crate::constants::power_supply::{POWERSUPPLY_FEEDBACK_BITS, POWERSUPPLY_VREF};
use crate::error::Error;
use crate::types::Measurement;

use anyhow::Result;

const SAMPLE_BYTES: usize = 2;
const FG_OFFSET: usize = 0;
const DUT_OFFSET: usize = FG_OFFSET + MEASUREMENT_POINTS * SAMPLE_BYTES;
const PS_OFFSET: usize = DUT_OFFSET + MEASUREMENT_POINTS * SAMPLE_BYTES;

fn decode_channel(data: &[u8], offset: usize, vref: f64) -> Result<[f64; MEASUREMENT_POINTS]> {
    let mut samples = [0.0; MEASUREMENT_POINTS];
    for (i, sample) in samples.iter_mut().enumerate() {
        let start = offset + i * SAMPLE_BYTES;
        *sample = bytes_to_voltage(
            &data[start..start + SAMPLE_BYTES],
            vref,
            MEASUREMENT_BITS,
            true,
        )?;
    }
    Ok(samples)
}

/// ### Decode Measurement
///
/// Turn the raw wire block into voltages. DUT samples are multiplied by `range_multiplier`.
///
pub fn decode_measurement(wire: &[u8], range_multiplier: f64) -> Result<Measurement> {
    if wire.len() != MEASUREMENT_WIRE_BYTES {
        return Err(Error::Length {
            expected: MEASUREMENT_WIRE_BYTES,
            actual: wire.len(),
        }
        .into());
    }
    let data = combine_bytes(wire)?;

    let fg = decode_channel(&data, FG_OFFSET, FG_MEASUREMENT_VREF)?;
    let mut dut = decode_channel(&data, DUT_OFFSET, DUT_MEASUREMENT_VREF)?;
    for sample in dut.iter_mut() {
        *sample *= range_multiplier;
    }
    let ps_voltage = bytes_to_voltage(
        &data[PS_OFFSET..PS_OFFSET + SAMPLE_BYTES],
        POWERSUPPLY_VREF,
        POWERSUPPLY_FEEDBACK_BITS,
        false,
    )?;

    Ok(Measurement { fg, dut, ps_voltage })
}
