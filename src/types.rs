//! ## Types
//!
//! The different types used across the crate
//!

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;

use crate::clock::Clock;
use crate::constants::measurement::MEASUREMENT_POINTS;
use crate::constants::{misc, mode, range};
use crate::error::Error;

/// ### Shared Clock
///
/// Alias for a clock shared between the connection loop and the client.
///
pub type SharedClock = Rc<dyn Clock>;

/// ### Device Info
///
/// An attached transport endpoint as reported by enumeration.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position of the endpoint in the enumeration
    pub index: usize,
    /// Product description string programmed in the bridge
    pub description: String,
}

/// ### Queue Status
///
/// Bytes waiting in the receive and transmit queues of the bridge.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub rx_queue: usize,
    pub tx_queue: usize,
}

/// ### Device Mode
///
/// Operational mode reported by the FPGA.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Reset,
    Program,
    Inactive,
    Active,
    Unknown,
}

impl DeviceMode {
    /// ### From Response
    ///
    /// Look up a mode response byte. Only the high nibble is meaningful.
    ///
    pub fn from_response(byte: u8) -> Result<DeviceMode> {
        let key = crate::communication::nibble::cancel_ls_four_bits(byte);
        match mode::MODE_TABLE.iter().find(|(code, _)| *code == key) {
            Some((_, mode)) => Ok(*mode),
            None => Err(Error::UnknownMode(byte).into()),
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceMode::Reset => "reset",
            DeviceMode::Program => "programming",
            DeviceMode::Inactive => "inactive",
            DeviceMode::Active => "active",
            DeviceMode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// ### Range
///
/// DUT measurement range. Each range selects an attenuation on the DUT input which is undone
/// by multiplying the decoded voltage.
///
/// | Range | Span     | Multiplier |
/// |-------|----------|------------|
/// | 1     | 0-4 V    | 1.1        |
/// | 2     | 4-10 V   | 2.7        |
/// | 3     | 10-20 V  | 5.5        |
/// | 4     | 20-60 V  | 16.6       |
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Range {
    #[default]
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl Range {
    pub const ALL: [Range; 4] = [Range::One, Range::Two, Range::Three, Range::Four];

    /// The logical range number, 1 to 4
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn multiplier(self) -> f64 {
        range::DUT_MEASUREMENT_RANGE_MULTIPLIERS[self.index()]
    }

    /// The nibble sent on the wire to select this range
    pub fn code(self) -> u8 {
        range::DUT_MEASUREMENT_RANGE_CODES[self.index()]
    }

    /// ### From Code
    ///
    /// Reverse lookup of a range response byte. The low nibble is ignored.
    ///
    pub fn from_code(byte: u8) -> Result<Range> {
        let key = crate::communication::nibble::cancel_ls_four_bits(byte);
        match Range::ALL.iter().find(|r| r.code() == key) {
            Some(r) => Ok(*r),
            None => Err(Error::UnknownRange(byte).into()),
        }
    }

    fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u8> for Range {
    type Error = anyhow::Error;

    fn try_from(number: u8) -> Result<Range> {
        match number {
            1 => Ok(Range::One),
            2 => Ok(Range::Two),
            3 => Ok(Range::Three),
            4 => Ok(Range::Four),
            n => Err(Error::ValueOutOfRange(format!("range {n} is not one of 1, 2, 3, 4")).into()),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// ### Measurement
///
/// One synchronized capture. Samples are in capture order, period-major.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Function generator output, volts
    pub fg: [f64; MEASUREMENT_POINTS],
    /// DUT output scaled by the active range multiplier, volts
    pub dut: [f64; MEASUREMENT_POINTS],
    /// Power supply feedback, volts
    pub ps_voltage: f64,
}

impl Measurement {
    pub fn into_tuple(self) -> ([f64; MEASUREMENT_POINTS], [f64; MEASUREMENT_POINTS], f64) {
        (self.fg, self.dut, self.ps_voltage)
    }
}

/// ### Client Config
///
/// Timeouts and poll quanta used by the client.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Keep retrying the connection for this long. `None` fails on the first error.
    pub connect_timeout: Option<Duration>,
    pub retry_interval: Duration,
    pub poll_interval: Duration,
    /// Wait for mode and range responses
    pub response_timeout: Duration,
    pub echo_timeout: Duration,
    pub measurement_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            retry_interval: misc::CONNECT_RETRY_INTERVAL,
            poll_interval: misc::READ_POLL_INTERVAL,
            response_timeout: misc::RESPONSE_TIMEOUT,
            echo_timeout: misc::ECHO_TIMEOUT,
            measurement_timeout: misc::MEASUREMENT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }

    pub fn with_measurement_timeout(mut self, timeout: Duration) -> Self {
        self.measurement_timeout = timeout;
        self
    }
}
