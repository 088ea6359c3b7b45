//! ## Initialization
//!
//! A set of functions to find the instrument and open a connection to it.
//!

use std::time::Duration;

use crate::{
    clock::Clock,
    communication::transport::{Bus, Transport},
    constants::usb::SIMPS_DESCRIPTIONS,
    error::Error,
    types::DeviceInfo,
};

use anyhow::Result;
use log::{debug, info, warn};

fn is_simps_device(device: &DeviceInfo) -> bool {
    SIMPS_DESCRIPTIONS.contains(&device.description.as_str())
}

/// ### List Devices
///
/// List every endpoint on the bus whose description names a SIMPS instrument.
///
pub fn list_devices<B: Bus>(bus: &mut B) -> Result<Vec<DeviceInfo>> {
    Ok(bus
        .enumerate()?
        .into_iter()
        .filter(is_simps_device)
        .collect())
}

/// ### Find SIMPS
///
/// Exactly one instrument must be attached, there is no way to tell several apart.
///
pub fn find_simps<B: Bus>(bus: &mut B) -> Result<DeviceInfo> {
    let mut devices = list_devices(bus)?;

    match devices.len() {
        0 => Err(Error::DeviceNotFound.into()),
        1 => Ok(devices.remove(0)),
        count => Err(Error::DeviceAmbiguous { count }.into()),
    }
}

/// Single attempt: find, open and reset. The port is closed again if the reset fails.
fn try_open<B: Bus>(bus: &mut B) -> Result<B::Port> {
    let device = find_simps(bus)?;
    debug!("opening {:?} at index {}", device.description, device.index);

    let mut port = bus.open(device.index)?;
    if let Err(e) = port.reset() {
        if let Err(close_err) = port.close() {
            warn!("failed to close port after reset error: {close_err}");
        }
        return Err(e);
    }

    Ok(port)
}

/// ### Open Device
///
/// Open the instrument, retrying every `retry_interval` until `timeout` has been spent.
///
/// Without a timeout the first error is returned as is. Once the timeout is spent the last error
/// is returned wrapped in [`Error::ConnectTimeout`].
///
pub fn open_device<B: Bus>(
    bus: &mut B,
    clock: &dyn Clock,
    timeout: Option<Duration>,
    retry_interval: Duration,
) -> Result<B::Port> {
    let mut elapsed = Duration::ZERO;
    let mut attempt: u32 = 1;

    loop {
        let err = match try_open(bus) {
            Ok(port) => {
                info!("connected to SIMPS ATE after {attempt} attempt(s)");
                return Ok(port);
            }
            Err(e) => e,
        };

        let timeout = match timeout {
            Some(t) => t,
            None => return Err(err),
        };
        if elapsed >= timeout {
            return Err(err.context(Error::ConnectTimeout { elapsed }));
        }

        warn!("connection attempt {attempt} failed: {err}, retrying");
        clock.sleep(retry_interval);
        elapsed += retry_interval;
        attempt += 1;
    }
}
