//! ## Constants
//!
//! Wire opcodes, lookup tables and numeric references shared by the firmware and the host.
//!

/// Single byte operation codes understood by the FPGA
pub mod opcodes {
    pub const OP_RESERVED: u8 = 0x00;
    /// Echo the following byte back. Needs data line D0 to trigger.
    pub const OP_ECHO: u8 = 0x10;
    /// Echo the following byte back. Needs data line D7 to trigger.
    pub const OP_ECHO_ALT: u8 = 0x80;
    pub const OP_PROGRAM: u8 = 0x20;
    pub const OP_DISABLE_PS: u8 = 0x30;
    pub const OP_ENABLE_PS: u8 = 0x40;
    pub const OP_TRIGGER_MEASUREMENT: u8 = 0x50;
    pub const OP_SET_RANGE: u8 = 0x60;
    pub const OP_GET_RANGE: u8 = 0xB0;
    pub const OP_DISABLE_FG: u8 = 0x70;
    pub const OP_ENABLE_FG: u8 = 0xC0;
    pub const OP_GET_MODE: u8 = 0x90;
    pub const OP_SET_PS: u8 = 0xA0;
}

/// Mode byte table, indexed by the high nibble of the response
pub mod mode {
    use crate::types::DeviceMode;

    pub const MODE_TABLE: [(u8, DeviceMode); 8] = [
        (0x00, DeviceMode::Reset),
        (0x10, DeviceMode::Reset),
        (0x20, DeviceMode::Reset),
        (0x30, DeviceMode::Program),
        (0x40, DeviceMode::Program),
        (0x50, DeviceMode::Program),
        (0x60, DeviceMode::Inactive),
        (0x70, DeviceMode::Active),
    ];
}

pub mod power_supply {
    /// Full scale of the power supply feedback ADC
    pub const POWERSUPPLY_VREF: f64 = 60.0;
    pub const POWERSUPPLY_MIN: f64 = 1.6;
    pub const POWERSUPPLY_MAX: f64 = 59.3;
    /// Width of the power supply set point code
    pub const POWERSUPPLY_BITS: u32 = 10;
    /// Width of the power supply feedback code
    pub const POWERSUPPLY_FEEDBACK_BITS: u32 = 12;
}

pub mod waveform {
    /// One period of the function generator is described by this many samples
    pub const WAVEFORM_SAMPLES_PER_PERIOD: usize = 8;
    /// Reference of the function generator DAC (bipolar, +/- 10V)
    pub const WAVEFORM_VREF: f64 = 10.0;
    pub const WAVEFORM_BITS: u32 = 12;
    /// Width of the frequency word in the program request
    pub const FREQUENCY_BITS: u32 = 24;
}

pub mod measurement {
    pub const MEASUREMENT_SAMPLES: usize = 8;
    pub const MEASUREMENT_PERIODS: usize = 3;
    /// Samples per channel in one capture
    pub const MEASUREMENT_POINTS: usize = MEASUREMENT_SAMPLES * MEASUREMENT_PERIODS;
    /// Bytes of one capture after recombining the nibbles
    pub const MEASUREMENT_BYTES: usize = 2 * 2 * MEASUREMENT_POINTS + 2;
    /// Bytes of one capture as it comes off the wire
    pub const MEASUREMENT_WIRE_BYTES: usize = MEASUREMENT_BYTES * 2;
    pub const MEASUREMENT_BITS: u32 = 12;
    pub const FG_MEASUREMENT_VREF: f64 = 2.5;
    pub const DUT_MEASUREMENT_VREF: f64 = 1.0;
}

pub mod range {
    /// Multipliers for ranges 1, 2, 3, 4 respectively
    pub const DUT_MEASUREMENT_RANGE_MULTIPLIERS: [f64; 4] = [1.1, 2.7, 5.5, 16.6];
    /// Wire codes for ranges 1, 2, 3, 4. Inverted so the binary matches the pin outputs.
    pub const DUT_MEASUREMENT_RANGE_CODES: [u8; 4] = [0x30, 0x20, 0x10, 0x00];
}

pub mod usb {
    /// FTDI vendor id
    pub const FTDI_VENDOR_ID: u16 = 0x0403;
    /// Product descriptions the instrument's FTDI EEPROM may be programmed with
    pub const SIMPS_DESCRIPTIONS: [&str; 2] = ["SIMPS Device", "SIMPS ATE"];

    /// FTDI vendor request to reset or purge the chip
    pub const SIO_RESET_REQUEST: u8 = 0x00;
    pub const SIO_RESET_SIO: u16 = 0;
    pub const SIO_RESET_PURGE_RX: u16 = 1;
    pub const SIO_RESET_PURGE_TX: u16 = 2;
    /// FTDI interface A, as used in the wIndex of vendor requests
    pub const FTDI_INTERFACE_A: u16 = 1;
    /// Number of modem status bytes leading each bulk IN packet
    pub const FTDI_STATUS_BYTES: usize = 2;
}

#[allow(unused)]
pub mod misc {
    use std::time::Duration;

    /// Sleep between connection attempts
    pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);
    /// Sleep between rx queue checks while waiting for data
    pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);
    /// Wait for single byte responses (mode, range)
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);
    /// Wait for an echo during validation
    pub const ECHO_TIMEOUT: Duration = Duration::from_secs(2);
    /// Wait for a full measurement block
    pub const MEASUREMENT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Time the firmware needs to recover from a truncated echo
    pub const ECHO_LOCKUP_RECOVERY: Duration = Duration::from_millis(500);
    /// Timeout of a single libusb transfer
    pub const USB_TRANSFER_TIMEOUT: Duration = Duration::from_millis(500);
    /// Timeout used to drain pending bulk data when checking the rx queue
    pub const USB_DRAIN_TIMEOUT: Duration = Duration::from_millis(1);
}
