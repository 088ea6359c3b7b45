//! # SIMPS ATE
//!
//! Host side driver for the SIMPS automated test equipment: an FPGA driving a programmable power
//! supply, a function generator and a ranged DUT measurement front end, reached through an FTDI
//! USB FIFO bridge.
//!
//! The FIFO bus to the FPGA only carries four reliable bits per transfer, so most requests travel
//! as split nibbles (see [`communication::nibble`]). Voltages are converted to and from the
//! converter codes by [`communication::codec`].
//!
//! ## Usage
//!
//! To use, add the following line to your project's Cargo.toml dependencies:
//! ```toml
//! simps-ate = "0.1"
//! ```
//!
//! ## Example
//!
//! The example below connects, checks the wiring, programs the device and takes a measurement.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use simps_ate::{Range, SimpsClient};
//!
//! fn main() -> anyhow::Result<()> {
//!     // connect to the device, retrying for up to five seconds
//!     let mut device = SimpsClient::connect(Some(Duration::from_secs(5)))?;
//!
//!     // make sure every data line works
//!     device.validate_communications()?;
//!
//!     // 24 V supply, 1 kHz square wave, DUT range 3
//!     let waveform = [5.0, 5.0, 5.0, 5.0, -5.0, -5.0, -5.0, -5.0];
//!     device.program(24.0, 1_000, &waveform, Range::Three)?;
//!     device.enable_ps()?;
//!     device.enable_fg()?;
//!
//!     let measurement = device.measurement()?;
//!     println!("power supply at {} V", measurement.ps_voltage);
//!
//!     // the connection is also released when the client is dropped
//!     device.close()
//! }
//! ```
//!

mod clock;
pub mod constants;
mod error;
mod init;
mod measurement;
mod types;
mod validation;
pub mod communication {
    pub mod codec;
    pub mod command;
    pub mod ftdi;
    pub mod nibble;
    pub mod transport;
}

pub use clock::{Clock, SystemClock};
pub use communication::ftdi::{FtdiBus, FtdiPort};
pub use communication::transport::{Bus, Transport};
pub use error::Error;
pub use measurement::decode_measurement;
pub use types::{
    ClientConfig, DeviceInfo, DeviceMode, Measurement, QueueStatus, Range, SharedClock,
};
pub use validation::{analyze_echoes, stuck_lines, PATTERN_A, PATTERN_B};

use std::rc::Rc;
use std::time::Duration;

use communication::{command, transport};
use constants::measurement::MEASUREMENT_WIRE_BYTES;
use constants::misc::ECHO_LOCKUP_RECOVERY;
use constants::opcodes::*;

use anyhow::Result;
use log::{debug, error, info, warn};

/// ### SimpsClient
///
/// Client connected to a SIMPS ATE device. The connection is closed by [`SimpsClient::close`]
/// or, failing that, when the client is dropped.
///
pub struct SimpsClient<T: Transport = FtdiPort> {
    port: Option<T>,
    clock: SharedClock,
    config: ClientConfig,
    range: Range,
}

impl SimpsClient<FtdiPort> {
    /// ### SIMPS devices
    ///
    /// Get a list of attached SIMPS devices
    ///
    pub fn devices() -> Result<Vec<DeviceInfo>> {
        let mut bus = FtdiBus::new()?;

        init::list_devices(&mut bus)
    }

    /// ### Connect
    ///
    /// Find the one attached SIMPS device, open and reset it.
    ///
    /// With a `timeout`, failed attempts are retried every 250 ms until the timeout is spent.
    ///
    pub fn connect(timeout: Option<Duration>) -> Result<SimpsClient<FtdiPort>> {
        let config = ClientConfig::default().with_connect_timeout(timeout);
        let mut bus = FtdiBus::new()?;

        SimpsClient::connect_with(&mut bus, Rc::new(SystemClock), config)
    }
}

impl<T: Transport> SimpsClient<T> {
    /// ### Connect With
    ///
    /// Connect through any bus, sleeping on `clock` between attempts.
    ///
    pub fn connect_with<B: Bus<Port = T>>(
        bus: &mut B,
        clock: SharedClock,
        config: ClientConfig,
    ) -> Result<SimpsClient<T>> {
        let port = init::open_device(
            bus,
            clock.as_ref(),
            config.connect_timeout,
            config.retry_interval,
        )?;

        Ok(SimpsClient::from_port(port, clock, config))
    }

    /// Wrap a transport that is already open and reset
    pub fn from_port(port: T, clock: SharedClock, config: ClientConfig) -> SimpsClient<T> {
        SimpsClient {
            port: Some(port),
            clock,
            config,
            range: Range::default(),
        }
    }

    /// ### Close
    ///
    /// Release the transport. Closing a client that is already closed does nothing.
    ///
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.close()?;
            info!("connection to SIMPS ATE closed");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The range last set or read back, without asking the device
    pub fn range(&self) -> Range {
        self.range
    }

    /// Multiplier applied to DUT samples for the cached range
    pub fn range_multiplier(&self) -> f64 {
        self.range.multiplier()
    }

    // TRANSFER HELPERS
    // ==========

    fn port(&mut self) -> Result<&mut T> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(Error::NotConnected.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        debug!("writing {data:02x?}");
        self.port()?.write(data)
    }

    fn purge_and_write(&mut self, data: &[u8]) -> Result<()> {
        self.port()?.purge()?;
        self.write(data)
    }

    fn read(&mut self, n: usize, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let port = match self.port.as_mut() {
            Some(port) => port,
            None => return Err(Error::NotConnected.into()),
        };

        transport::try_read(
            port,
            self.clock.as_ref(),
            n,
            Some(timeout),
            self.config.poll_interval,
        )
    }

    /// Purge, send `request` and wait for a single byte
    fn query_byte(&mut self, request: &[u8], timeout: Duration) -> Result<Option<u8>> {
        self.purge_and_write(request)?;
        Ok(self.read(1, timeout)?.and_then(|r| r.first().copied()))
    }

    fn set_cached_range(&mut self, range: Range) {
        self.range = range;
        debug!("range {range}, DUT multiplier {}", range.multiplier());
    }

    // COMMANDS
    // ==========

    /// ### Program
    ///
    /// Program the power supply set point, the function generator frequency and waveform table
    /// and the DUT range in one request.
    ///
    /// #### Arguments
    /// - `ps_voltage` -> power supply voltage, 1.6 to 59.3 V, sent in whole volts
    /// - `frequency` -> waveform frequency in Hz, at most 24 bits
    /// - `waveform` -> exactly 8 samples of one period, each within +/-10 V
    /// - `range` -> DUT measurement range
    ///
    pub fn program(
        &mut self,
        ps_voltage: f64,
        frequency: u32,
        waveform: &[f64],
        range: Range,
    ) -> Result<()> {
        let request = command::program_request(ps_voltage, frequency, waveform, range)?;

        self.purge_and_write(&request)?;
        self.set_cached_range(range);
        info!("programmed {ps_voltage} V, {frequency} Hz, range {range}");

        Ok(())
    }

    /// ### Get Mode
    ///
    /// Ask the FPGA for its operational mode. A mode byte outside the table is reported as
    /// [`DeviceMode::Unknown`].
    ///
    pub fn get_mode(&mut self) -> Result<DeviceMode> {
        let timeout = self.config.response_timeout;
        let byte = match self.query_byte(&[OP_GET_MODE], timeout)? {
            Some(b) => b,
            None => {
                return Err(Error::NoResponse {
                    opcode: OP_GET_MODE,
                    expected: 1,
                }
                .into())
            }
        };

        match DeviceMode::from_response(byte) {
            Ok(mode) => Ok(mode),
            Err(e) => {
                warn!("{e}");
                Ok(DeviceMode::Unknown)
            }
        }
    }

    /// ### Set Power Supply
    ///
    /// Change the power supply set point, 1.6 to 59.3 V, sent in whole volts.
    ///
    pub fn set_ps(&mut self, ps_voltage: f64) -> Result<()> {
        let request = command::set_ps_request(ps_voltage)?;
        self.purge_and_write(&request)
    }

    pub fn enable_ps(&mut self) -> Result<()> {
        self.purge_and_write(&[OP_ENABLE_PS])
    }

    pub fn disable_ps(&mut self) -> Result<()> {
        self.purge_and_write(&[OP_DISABLE_PS])
    }

    pub fn enable_fg(&mut self) -> Result<()> {
        self.purge_and_write(&[OP_ENABLE_FG])
    }

    pub fn disable_fg(&mut self) -> Result<()> {
        self.purge_and_write(&[OP_DISABLE_FG])
    }

    /// ### Set Range
    ///
    /// Select the DUT measurement range and update the cached multiplier.
    ///
    pub fn set_range(&mut self, range: Range) -> Result<()> {
        self.purge_and_write(&command::set_range_request(range))?;
        self.set_cached_range(range);
        Ok(())
    }

    /// ### Get Range
    ///
    /// Read the DUT measurement range back from the device and update the cached multiplier.
    ///
    pub fn get_range(&mut self) -> Result<Range> {
        let timeout = self.config.response_timeout;
        let byte = match self.query_byte(&[OP_GET_RANGE], timeout)? {
            Some(b) => b,
            None => {
                return Err(Error::NoResponse {
                    opcode: OP_GET_RANGE,
                    expected: 1,
                }
                .into())
            }
        };

        let range = Range::from_code(byte)?;
        self.set_cached_range(range);
        Ok(range)
    }

    /// ### Measurement
    ///
    /// Trigger a synchronized capture and decode it.
    ///
    /// The range is read back first so the DUT samples are scaled with the range actually in use.
    ///
    pub fn measurement(&mut self) -> Result<Measurement> {
        // REFRESH THE RANGE
        // ==========
        self.get_range()?;

        // TRIGGER
        // ==========
        self.purge_and_write(&[OP_TRIGGER_MEASUREMENT])?;

        // CAPTURE
        // ==========
        let timeout = self.config.measurement_timeout;
        let wire = match self.read(MEASUREMENT_WIRE_BYTES, timeout)? {
            Some(w) => w,
            None => {
                return Err(Error::NoResponse {
                    opcode: OP_TRIGGER_MEASUREMENT,
                    expected: MEASUREMENT_WIRE_BYTES,
                }
                .into())
            }
        };

        // DECODE
        // ==========
        decode_measurement(&wire, self.range.multiplier())
    }

    // DIAGNOSTICS
    // ==========

    /// ### Echo
    ///
    /// Send `pattern` with an echo opcode and return what came back, if anything.
    ///
    /// #### Arguments
    /// - `opcode` -> [`OP_ECHO`] (needs D0) or [`OP_ECHO_ALT`] (needs D7), anything else is
    ///   rejected before any IO
    /// - `pattern` -> the byte to echo
    ///
    pub fn echo(&mut self, opcode: u8, pattern: u8) -> Result<Option<u8>> {
        if opcode != OP_ECHO && opcode != OP_ECHO_ALT {
            return Err(
                Error::ValueOutOfRange(format!("{opcode:#04x} is not an echo opcode")).into(),
            );
        }

        let timeout = self.config.echo_timeout;
        self.query_byte(&command::echo_request(opcode, pattern), timeout)
    }

    fn echo_pair(&mut self, opcode: u8) -> Result<Option<(u8, u8)>> {
        let a = self.echo(opcode, PATTERN_A)?;
        let b = self.echo(opcode, PATTERN_B)?;
        Ok(a.zip(b))
    }

    /// ### Validate Communications
    ///
    /// Detect wiring errors on the data bus between the bridge and the FPGA.
    ///
    /// Fails with [`Error::LinkDead`] when neither echo opcode gets an answer,
    /// [`Error::StuckLine`] when a data line does not toggle and [`Error::ReversedBus`] when the
    /// lines are wired in reverse order.
    ///
    pub fn validate_communications(&mut self) -> Result<()> {
        info!("detecting wiring errors");

        let (a, b) = match self.echo_pair(OP_ECHO)? {
            Some(pair) => pair,
            // the primary echo needs D0, the alternate one only needs D7
            None => match self.echo_pair(OP_ECHO_ALT)? {
                Some(pair) => pair,
                None => {
                    error!("no data was successfully exchanged with the FPGA");
                    error!("check the data bus for continuity between the FTDI chip and the FPGA");
                    error!("check the control lines RXFn, TXEn, RDn, WRn and SIWUn");
                    error!("check that the FPGA firmware is flashed");
                    return Err(Error::LinkDead.into());
                }
            },
        };
        debug!("echo responses {a:#04x} and {b:#04x}");

        analyze_echoes(a, b)?;
        info!("no wiring errors were detected");

        Ok(())
    }

    fn expect_echo(&mut self, pattern: u8) -> Result<()> {
        let timeout = self.config.response_timeout;
        match self.query_byte(&command::echo_request(OP_ECHO, pattern), timeout)? {
            Some(received) if received == pattern => Ok(()),
            Some(received) => Err(Error::EchoMismatch {
                sent: pattern,
                received,
            }
            .into()),
            None => Err(Error::NoResponse {
                opcode: OP_ECHO,
                expected: 1,
            }
            .into()),
        }
    }

    /// ### Self Test
    ///
    /// Check the echo path, then check the firmware recovers from an echo request that never
    /// receives its data byte.
    ///
    pub fn self_test(&mut self) -> Result<()> {
        info!("testing echo");
        self.expect_echo(0x50)?;

        info!("testing echo lockup recovery");
        self.purge_and_write(&[OP_ECHO])?;
        self.clock.sleep(ECHO_LOCKUP_RECOVERY);
        self.expect_echo(0x60)?;

        info!("self test passed");
        Ok(())
    }
}

impl<T: Transport> Drop for SimpsClient<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close SIMPS ATE connection: {e}");
        }
    }
}
