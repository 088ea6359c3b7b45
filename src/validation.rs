//! ## Validation
//!
//! Wiring self test of the data bus between the bridge and the FPGA.
//!
//! Two complementary patterns are echoed. Every data line must toggle between the two
//! responses, and the responses must not come back mirrored.
//!

use crate::error::Error;

use anyhow::Result;
use log::error;

pub const PATTERN_A: u8 = 0xAA;
pub const PATTERN_B: u8 = 0x55;

/// Data lines, D0 being the least significant bit, that did not toggle between the responses
pub fn stuck_lines(a: u8, b: u8) -> Vec<u8> {
    let xor = a ^ b;
    (0..8u8).filter(|line| xor & (1 << line) == 0).collect()
}

/// ### Analyze Echoes
///
/// Check the responses `a` and `b` to [`PATTERN_A`] and [`PATTERN_B`].
///
pub fn analyze_echoes(a: u8, b: u8) -> Result<()> {
    let stuck = stuck_lines(a, b);
    if let Some(&line) = stuck.first() {
        for line in &stuck {
            error!("error detected with data line D{line}");
        }
        return Err(Error::StuckLine { line }.into());
    }

    if a == PATTERN_B || b == PATTERN_A {
        error!("data lines are backwards, they can be flipped in the firmware pinout");
        return Err(Error::ReversedBus.into());
    }

    Ok(())
}
