//! ## Transport
//!
//! Boundary to the USB bridge. The client only needs byte level access to the FIFO, so
//! anything that can enumerate, open and move bytes can stand in for the FTDI chip.
//!

use std::time::Duration;

use crate::clock::Clock;
use crate::types::{DeviceInfo, QueueStatus};

use anyhow::Result;
use log::debug;

/// An open connection to one bridge
pub trait Transport {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    /// Read up to `n` bytes that are already queued.
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;
    fn status(&mut self) -> Result<QueueStatus>;
    /// Drop everything pending in both directions.
    fn purge(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Enumerates and opens bridges
pub trait Bus {
    type Port: Transport;

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>>;
    fn open(&mut self, index: usize) -> Result<Self::Port>;
}

/// ### Try Read
///
/// Read exactly `n` bytes once they are queued.
///
/// Without a timeout the queue is checked once. With a timeout the queue is polled every
/// `poll_interval` until the bytes are there or the timeout has elapsed. Running out of time is
/// reported as `Ok(None)`.
///
pub fn try_read<T: Transport + ?Sized>(
    port: &mut T,
    clock: &dyn Clock,
    n: usize,
    timeout: Option<Duration>,
    poll_interval: Duration,
) -> Result<Option<Vec<u8>>> {
    let poll_interval = poll_interval.max(Duration::from_millis(1));
    let mut status = port.status()?;

    let timeout = match timeout {
        Some(t) => t,
        None if status.rx_queue >= n => return Ok(Some(port.read(n)?)),
        None => return Ok(None),
    };

    let mut elapsed = Duration::ZERO;
    loop {
        if status.rx_queue >= n {
            let data = port.read(n)?;
            debug!("read {} bytes after {:?}", data.len(), elapsed);
            return Ok(Some(data));
        }

        if elapsed >= timeout {
            debug!("timed out waiting for {n} bytes, {} queued", status.rx_queue);
            return Ok(None);
        }

        clock.sleep(poll_interval);
        elapsed += poll_interval;

        status = port.status()?;
    }
}
