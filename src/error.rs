//! ## SIMPS Errors
//!
//! The errors used throughout the crate.
//!

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not find a SIMPS ATE device, make sure the FTDI chip is programmed")]
    DeviceNotFound,
    #[error("found {count} SIMPS ATE devices, only one may be attached")]
    DeviceAmbiguous { count: usize },
    #[error("gave up connecting after {elapsed:?}")]
    ConnectTimeout { elapsed: Duration },
    #[error("device is not connected")]
    NotConnected,
    #[error("no response to opcode {opcode:#04x}, expected {expected} bytes")]
    NoResponse { opcode: u8, expected: usize },
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("cannot recombine an odd number of nibble bytes ({0})")]
    OddLength(usize),
    #[error("unknown mode byte {0:#04x}")]
    UnknownMode(u8),
    #[error("unknown range byte {0:#04x}")]
    UnknownRange(u8),
    #[error("no data was exchanged with the FPGA")]
    LinkDead,
    #[error("data line D{line} is stuck")]
    StuckLine { line: u8 },
    #[error("data lines are wired in reverse order")]
    ReversedBus,
    #[error("echoed {sent:#04x} but received {received:#04x}")]
    EchoMismatch { sent: u8, received: u8 },
    #[error("bulk endpoint not found")]
    UsbEndpointNotFound,
    #[error("bulk write stalled after {written} of {expected} bytes")]
    WriteStalled { written: usize, expected: usize },
}
