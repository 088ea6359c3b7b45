//! ## Clock
//!
//! Sleeping is routed through a trait so retry and polling loops can run on virtual time.
//!

use std::time::Duration;

pub trait Clock {
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
