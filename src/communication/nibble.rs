//! ## Nibble Framing
//!
//! The FIFO bus between the bridge and the FPGA only presents four reliable bits per transfer,
//! so payloads travel as half bytes in the high nibble of each transfer.
//!

use crate::error::Error;

use anyhow::Result;

/// ### Split Bytes
///
/// Split each byte into its high and low nibble, each moved into the high half of its own byte.
/// All the high nibbles are sent first, followed by all the low nibbles.
///
pub fn split_bytes(payload: &[u8]) -> Vec<u8> {
    let msb_parts = payload.iter().map(|b| b & 0xF0);
    let lsb_parts = payload.iter().map(|b| b << 4);

    msb_parts.chain(lsb_parts).collect()
}

/// ### Combine Bytes
///
/// Inverse of [`split_bytes`]. Only the high nibble of each incoming byte is used.
///
pub fn combine_bytes(buffer: &[u8]) -> Result<Vec<u8>> {
    if buffer.len() % 2 != 0 {
        return Err(Error::OddLength(buffer.len()).into());
    }

    let (msb_parts, lsb_parts) = buffer.split_at(buffer.len() / 2);
    Ok(msb_parts
        .iter()
        .zip(lsb_parts)
        .map(|(ms, ls)| (ms & 0xF0) | (ls >> 4))
        .collect())
}

/// ### Fix Power Supply Bytes
///
/// Route the 10 bit power supply code around the dead third data line.
///
/// With bits numbered from the MSB of each byte and input `[ms, ls]`:
/// - `ms' = ms[4..8] ++ ls[0] ++ 000`
/// - `ls' = ls[1..6] ++ 0 ++ ls[6..8]`
///
/// `0000.0011.1111.1111` becomes `0011.1000.1111.1011`.
///
pub fn fix_ps_bytes(bytes: [u8; 2]) -> [u8; 2] {
    let [ms, ls] = bytes;

    let new_ms = ((ms & 0x0F) << 4) | ((ls & 0x80) >> 4);
    let new_ls = ((ls << 1) & 0xF8) | (ls & 0x03);

    [new_ms, new_ls]
}

/// Make `1111.xxxx` into `1111.0000`
pub fn cancel_ls_four_bits(byte: u8) -> u8 {
    byte & 0xF0
}
