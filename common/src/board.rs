use std::{
    thread,
    time::{Duration, Instant},
};

/// Timing and reset services of the device the session runs on.
pub trait Board {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Blocks the session thread; the platform is expected to run its
    /// background radio tasks meanwhile.
    fn delay_ms(&self, ms: u64);

    /// Reboots the device. Hosts without a reboot may return, in which case
    /// the session stops instead.
    fn restart(&self);
}

#[derive(Debug, Clone)]
pub struct StdBoard {
    origin: Instant,
}

impl StdBoard {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for StdBoard {
    fn now_ms(&self) -> u64 {
        self.origin
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn delay_ms(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    fn restart(&self) {
        log::warn!("restart requested; this board cannot reboot, stopping session instead");
    }
}
