//! Scripted stand-ins for the bridge, the FPGA behind it and the wall clock.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use simps_ate::communication::nibble::combine_bytes;
use simps_ate::constants::opcodes::*;
use simps_ate::{Bus, Clock, DeviceInfo, QueueStatus, Transport};

pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8>>;

pub struct PortState {
    pub rx: VecDeque<u8>,
    pub writes: Vec<Vec<u8>>,
    pub purges: usize,
    pub resets: usize,
    pub closes: usize,
    pub closed: bool,
    pub fail_reset: bool,
    responder: Responder,
}

impl PortState {
    pub fn new(responder: Responder) -> Rc<RefCell<PortState>> {
        Rc::new(RefCell::new(PortState {
            rx: VecDeque::new(),
            writes: Vec::new(),
            purges: 0,
            resets: 0,
            closes: 0,
            closed: false,
            fail_reset: false,
            responder,
        }))
    }
}

pub struct MockPort {
    pub state: Rc<RefCell<PortState>>,
}

impl Transport for MockPort {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.closed {
            return Err(anyhow!("write on closed port"));
        }
        state.writes.push(data.to_vec());
        let response = (state.responder)(data);
        state.rx.extend(response);
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        let count = n.min(state.rx.len());
        Ok(state.rx.drain(..count).collect())
    }

    fn status(&mut self) -> Result<QueueStatus> {
        Ok(QueueStatus {
            rx_queue: self.state.borrow().rx.len(),
            tx_queue: 0,
        })
    }

    fn purge(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.purges += 1;
        state.rx.clear();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.resets += 1;
        if state.fail_reset {
            return Err(anyhow!("reset failed"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.closes += 1;
        state.closed = true;
        Ok(())
    }
}

/// Bus whose first `failures` enumerations come back empty
pub struct MockBus {
    pub devices: Vec<DeviceInfo>,
    pub failures: usize,
    pub enumerations: usize,
    pub opened: Vec<usize>,
    pub port: Rc<RefCell<PortState>>,
}

impl MockBus {
    pub fn new(descriptions: &[&str], port: Rc<RefCell<PortState>>) -> MockBus {
        MockBus {
            devices: descriptions
                .iter()
                .enumerate()
                .map(|(index, d)| DeviceInfo {
                    index,
                    description: d.to_string(),
                })
                .collect(),
            failures: 0,
            enumerations: 0,
            opened: Vec::new(),
            port,
        }
    }

    pub fn failing(mut self, failures: usize) -> MockBus {
        self.failures = failures;
        self
    }
}

impl Bus for MockBus {
    type Port = MockPort;

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        self.enumerations += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Ok(Vec::new());
        }
        Ok(self.devices.clone())
    }

    fn open(&mut self, index: usize) -> Result<MockPort> {
        self.opened.push(index);
        self.port.borrow_mut().closed = false;
        Ok(MockPort {
            state: Rc::clone(&self.port),
        })
    }
}

/// Clock that only counts the time it was asked to sleep
#[derive(Default)]
pub struct VirtualClock {
    pub slept: Cell<Duration>,
    pub sleeps: Cell<u32>,
}

impl Clock for VirtualClock {
    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// Behaviour of the FPGA as seen through the FIFO
pub struct FakeFpga {
    pub mode: u8,
    pub range_code: u8,
    pub capture: Vec<u8>,
    pub echo: Option<fn(u8) -> u8>,
    pub echo_alt: Option<fn(u8) -> u8>,
}

impl Default for FakeFpga {
    fn default() -> Self {
        FakeFpga {
            mode: 0x60,
            range_code: 0x30,
            capture: Vec::new(),
            echo: Some(|b| b),
            echo_alt: Some(|b| b),
        }
    }
}

impl FakeFpga {
    pub fn into_responder(mut self) -> Responder {
        Box::new(move |data: &[u8]| match (data[0], data.get(1)) {
            (OP_GET_MODE, None) => vec![self.mode],
            // only the high nibble is driven, the rest floats
            (OP_GET_RANGE, None) => vec![self.range_code | 0x05],
            (OP_SET_RANGE, Some(code)) => {
                self.range_code = *code;
                Vec::new()
            }
            (OP_PROGRAM, Some(_)) => {
                if let Ok(payload) = combine_bytes(&data[1..]) {
                    if let Some(code) = payload.last() {
                        self.range_code = *code;
                    }
                }
                Vec::new()
            }
            (OP_TRIGGER_MEASUREMENT, None) => self.capture.clone(),
            (OP_ECHO, Some(b)) => self.echo.map(|f| vec![f(*b)]).unwrap_or_default(),
            (OP_ECHO_ALT, Some(b)) => self.echo_alt.map(|f| vec![f(*b)]).unwrap_or_default(),
            _ => Vec::new(),
        })
    }
}
