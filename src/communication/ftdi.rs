//! ## FTDI
//!
//! Transport over an FTDI bridge in FIFO mode, driven directly through libusb.
//!

use std::collections::VecDeque;
use std::time::Duration;

use crate::communication::transport::{Bus, Transport};
use crate::constants::{misc, usb::*};
use crate::error::Error;
use crate::types::{DeviceInfo, QueueStatus};

use anyhow::Result;
use log::{debug, warn};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};

/// The FIFO lives on the first interface of the chip
const FIFO_INTERFACE: u8 = 0;

/// ### Endpoint
///
/// Properties of a bulk endpoint.
///
#[derive(Clone, Debug)]
struct Endpoint {
    address: u8,
    max_packet_size: usize,
}

/// ### FTDI Bus
///
/// Enumerates FTDI chips attached to the host.
///
pub struct FtdiBus {
    context: Context,
}

impl FtdiBus {
    pub fn new() -> Result<FtdiBus> {
        Ok(FtdiBus {
            context: Context::new()?,
        })
    }

    fn ftdi_devices(&self) -> Result<Vec<Device<Context>>> {
        Ok(self
            .context
            .devices()?
            .iter()
            .filter(|device| {
                device
                    .device_descriptor()
                    .map(|desc| desc.vendor_id() == FTDI_VENDOR_ID)
                    .unwrap_or(false)
            })
            .collect())
    }
}

/// Read the product string, which is what the EEPROM names the chip
fn product_description(device: &Device<Context>) -> Result<String> {
    let device_desc = device.device_descriptor()?;
    let handle = device.open()?;
    Ok(handle.read_product_string_ascii(&device_desc)?)
}

impl Bus for FtdiBus {
    type Port = FtdiPort;

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();
        for (index, device) in self.ftdi_devices()?.iter().enumerate() {
            // chips claimed by another process cannot be described, skip them
            match product_description(device) {
                Ok(description) => devices.push(DeviceInfo { index, description }),
                Err(e) => debug!("skipping FTDI device {index}: {e}"),
            }
        }
        Ok(devices)
    }

    fn open(&mut self, index: usize) -> Result<FtdiPort> {
        let devices = self.ftdi_devices()?;
        let device = match devices.get(index) {
            Some(d) => d,
            None => return Err(Error::DeviceNotFound.into()),
        };

        let (bulk_in, bulk_out) = get_endpoints(device)?;
        let handle = device.open()?;
        let has_kernel_driver = claim_fifo(&handle)?;

        Ok(FtdiPort {
            handle,
            has_kernel_driver,
            bulk_in,
            bulk_out,
            rx: VecDeque::new(),
            open: true,
        })
    }
}

/// Interface ownership calls on an opened handle
trait FifoInterface {
    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&self, iface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&self, iface: u8) -> rusb::Result<()>;
    fn claim_interface(&self, iface: u8) -> rusb::Result<()>;
}

impl FifoInterface for DeviceHandle<Context> {
    fn kernel_driver_active(&self, iface: u8) -> rusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, iface)
    }

    fn detach_kernel_driver(&self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, iface)
    }

    fn attach_kernel_driver(&self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, iface)
    }

    fn claim_interface(&self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, iface)
    }
}

/// ### Claim FIFO
///
/// Detach the kernel driver if it is used and claim the FIFO interface. Returns whether a kernel
/// driver was detached. If the claim fails the kernel driver is given the interface back.
///
fn claim_fifo<H: FifoInterface>(handle: &H) -> Result<bool> {
    let has_kernel_driver = match handle.kernel_driver_active(FIFO_INTERFACE) {
        Ok(true) => {
            handle.detach_kernel_driver(FIFO_INTERFACE)?;
            true
        }
        _ => false,
    };

    if let Err(e) = handle.claim_interface(FIFO_INTERFACE) {
        if has_kernel_driver {
            if let Err(attach_err) = handle.attach_kernel_driver(FIFO_INTERFACE) {
                warn!("failed to reattach kernel driver: {attach_err}");
            }
        }
        return Err(e.into());
    }

    Ok(has_kernel_driver)
}

/// ### Write All
///
/// Push `data` through `write_bulk` until every byte is accepted. A transfer that accepts
/// nothing is an error rather than a reason to try again.
///
fn write_all<F>(data: &[u8], mut write_bulk: F) -> Result<()>
where
    F: FnMut(&[u8]) -> rusb::Result<usize>,
{
    let mut written = 0;
    while written < data.len() {
        match write_bulk(&data[written..])? {
            0 => {
                return Err(Error::WriteStalled {
                    written,
                    expected: data.len(),
                }
                .into())
            }
            n => written += n,
        }
    }

    Ok(())
}

/// ### Get Endpoints
///
/// Find the bulk IN and bulk OUT endpoints of the FIFO interface.
///
fn get_endpoints(device: &Device<Context>) -> Result<(Endpoint, Endpoint)> {
    let config_desc = device.active_config_descriptor()?;

    let mut bulk_in = None;
    let mut bulk_out = None;
    for interface in config_desc
        .interfaces()
        .filter(|i| i.number() == FIFO_INTERFACE)
    {
        for interface_desc in interface.descriptors() {
            for endpoint in interface_desc.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                let ep = Endpoint {
                    address: endpoint.address(),
                    max_packet_size: endpoint.max_packet_size() as usize,
                };
                match endpoint.direction() {
                    Direction::In => bulk_in = bulk_in.or(Some(ep)),
                    Direction::Out => bulk_out = bulk_out.or(Some(ep)),
                }
            }
        }
    }

    match (bulk_in, bulk_out) {
        (Some(i), Some(o)) => Ok((i, o)),
        _ => Err(Error::UsbEndpointNotFound.into()),
    }
}

/// ### FTDI Port
///
/// An open FTDI FIFO. Bytes coming from the chip are buffered here with the modem status
/// bytes removed, so the queue length reported by [`Transport::status`] is payload only.
///
pub struct FtdiPort {
    handle: DeviceHandle<Context>,
    has_kernel_driver: bool,
    bulk_in: Endpoint,
    bulk_out: Endpoint,
    rx: VecDeque<u8>,
    open: bool,
}

impl FtdiPort {
    fn vendor_request(&self, request: u8, value: u16) -> Result<()> {
        let request_type = rusb::request_type(
            Direction::Out,
            rusb::RequestType::Vendor,
            rusb::Recipient::Device,
        );
        self.handle.write_control(
            request_type,
            request,
            value,
            FTDI_INTERFACE_A,
            &[],
            misc::USB_TRANSFER_TIMEOUT,
        )?;
        Ok(())
    }

    /// Move whatever the chip has ready into the rx queue, one packet at a time.
    fn drain(&mut self, timeout: Duration) -> Result<()> {
        let mut packet = vec![0x00; self.bulk_in.max_packet_size];
        loop {
            let bytes_read = match self.handle.read_bulk(self.bulk_in.address, &mut packet, timeout) {
                Ok(n) => n,
                Err(rusb::Error::Timeout) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            // a status only packet means the chip has nothing more for us
            if bytes_read <= FTDI_STATUS_BYTES {
                return Ok(());
            }
            self.rx.extend(&packet[FTDI_STATUS_BYTES..bytes_read]);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.open {
            true => Ok(()),
            false => Err(Error::NotConnected.into()),
        }
    }
}

impl Transport for FtdiPort {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let address = self.bulk_out.address;
        let handle = &self.handle;
        write_all(data, |chunk| handle.write_bulk(address, chunk, misc::USB_TRANSFER_TIMEOUT))
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if self.rx.len() < n {
            self.drain(misc::USB_DRAIN_TIMEOUT)?;
        }

        let count = n.min(self.rx.len());
        Ok(self.rx.drain(..count).collect())
    }

    fn status(&mut self) -> Result<QueueStatus> {
        self.ensure_open()?;
        self.drain(misc::USB_DRAIN_TIMEOUT)?;

        Ok(QueueStatus {
            rx_queue: self.rx.len(),
            tx_queue: 0,
        })
    }

    fn purge(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.vendor_request(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX)?;
        self.vendor_request(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX)?;
        self.rx.clear();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.vendor_request(SIO_RESET_REQUEST, SIO_RESET_SIO)?;
        self.rx.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.rx.clear();

        // RESET THE CONFIGURATION
        // Release the interface
        self.handle.release_interface(FIFO_INTERFACE)?;
        // Reattach the kernel driver if it was disconnected
        if self.has_kernel_driver {
            self.handle.attach_kernel_driver(FIFO_INTERFACE)?;
        }

        Ok(())
    }
}

impl Drop for FtdiPort {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to release FTDI interface: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeHandle {
        driver_active: bool,
        claim_fails: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl FakeHandle {
        fn new(driver_active: bool, claim_fails: bool) -> FakeHandle {
            FakeHandle {
                driver_active,
                claim_fails,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl FifoInterface for FakeHandle {
        fn kernel_driver_active(&self, _iface: u8) -> rusb::Result<bool> {
            Ok(self.driver_active)
        }

        fn detach_kernel_driver(&self, _iface: u8) -> rusb::Result<()> {
            self.calls.borrow_mut().push("detach");
            Ok(())
        }

        fn attach_kernel_driver(&self, _iface: u8) -> rusb::Result<()> {
            self.calls.borrow_mut().push("attach");
            Ok(())
        }

        fn claim_interface(&self, _iface: u8) -> rusb::Result<()> {
            self.calls.borrow_mut().push("claim");
            match self.claim_fails {
                true => Err(rusb::Error::Busy),
                false => Ok(()),
            }
        }
    }

    #[test]
    fn claim_detaches_kernel_driver() {
        let handle = FakeHandle::new(true, false);
        assert!(claim_fifo(&handle).unwrap());
        assert_eq!(*handle.calls.borrow(), vec!["detach", "claim"]);
    }

    #[test]
    fn claim_without_kernel_driver() {
        let handle = FakeHandle::new(false, false);
        assert!(!claim_fifo(&handle).unwrap());
        assert_eq!(*handle.calls.borrow(), vec!["claim"]);
    }

    #[test]
    fn failed_claim_reattaches_kernel_driver() {
        let handle = FakeHandle::new(true, true);
        let err = claim_fifo(&handle).unwrap_err();
        assert!(matches!(err.downcast_ref::<rusb::Error>(), Some(rusb::Error::Busy)));
        assert_eq!(*handle.calls.borrow(), vec!["detach", "claim", "attach"]);
    }

    #[test]
    fn failed_claim_leaves_absent_driver_alone() {
        let handle = FakeHandle::new(false, true);
        assert!(claim_fifo(&handle).is_err());
        assert_eq!(*handle.calls.borrow(), vec!["claim"]);
    }

    #[test]
    fn write_all_follows_partial_transfers() {
        let chunks = RefCell::new(Vec::new());
        write_all(&[1, 2, 3, 4, 5], |chunk| {
            chunks.borrow_mut().push(chunk.to_vec());
            Ok(chunk.len().min(2))
        })
        .unwrap();
        assert_eq!(
            chunks.into_inner(),
            vec![vec![1, 2, 3, 4, 5], vec![3, 4, 5], vec![5]]
        );
    }

    #[test]
    fn write_all_stops_on_stalled_transfer() {
        let calls = Cell::new(0);
        let err = write_all(&[1, 2, 3], |_| {
            calls.set(calls.get() + 1);
            Ok(if calls.get() == 1 { 1 } else { 0 })
        })
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::WriteStalled {
                written: 1,
                expected: 3
            })
        ));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn write_all_propagates_usb_errors() {
        let err = write_all(&[1], |_| Err(rusb::Error::Timeout)).unwrap_err();
        assert!(matches!(err.downcast_ref::<rusb::Error>(), Some(rusb::Error::Timeout)));
    }
}
