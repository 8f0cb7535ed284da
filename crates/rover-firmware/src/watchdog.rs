//! [`LinkWatchdog`] – host liveness monitor.
//!
//! Every recognised command counts as a heartbeat. When the host has been
//! silent for longer than the timeout the link is considered stale and the
//! control loop must not stay in Manual mode, so the robot is never driven
//! open-loop past the timeout.
//!
//! Time is passed in as milliseconds since boot so the watchdog works with a
//! hardware tick counter and with simulated clocks alike.

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHealth {
    /// A heartbeat arrived within the timeout.
    Fresh,
    /// No heartbeat for longer than the timeout.
    Stale,
}

/// # Example
///
/// ```
/// use rover_firmware::watchdog::{LinkHealth, LinkWatchdog};
///
/// let mut wd = LinkWatchdog::new(3000, 0);
/// wd.heartbeat(1000);
/// assert_eq!(wd.health(3500), LinkHealth::Fresh);
/// assert_eq!(wd.health(4001), LinkHealth::Stale);
/// ```
#[derive(Debug, Clone)]
pub struct LinkWatchdog {
    timeout_ms: u64,
    last_heartbeat_ms: u64,
}

impl LinkWatchdog {
    /// Create a watchdog whose first deadline counts from `now_ms`.
    pub fn new(timeout_ms: u64, now_ms: u64) -> Self {
        Self {
            timeout_ms,
            last_heartbeat_ms: now_ms,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn heartbeat(&mut self, now_ms: u64) {
        self.last_heartbeat_ms = self.last_heartbeat_ms.max(now_ms);
    }

    pub fn silence_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    pub fn health(&self, now_ms: u64) -> LinkHealth {
        if self.silence_ms(now_ms) > self.timeout_ms {
            LinkHealth::Stale
        } else {
            LinkHealth::Fresh
        }
    }
}

impl Default for LinkWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_after_creation() {
        let wd = LinkWatchdog::new(100, 50);
        assert_eq!(wd.health(150), LinkHealth::Fresh);
        assert_eq!(wd.health(151), LinkHealth::Stale);
    }

    #[test]
    fn heartbeat_pushes_the_deadline() {
        let mut wd = LinkWatchdog::new(100, 0);
        wd.heartbeat(90);
        assert_eq!(wd.health(180), LinkHealth::Fresh);
        assert_eq!(wd.silence_ms(180), 90);
    }

    #[test]
    fn heartbeat_from_the_past_is_ignored() {
        let mut wd = LinkWatchdog::new(100, 500);
        wd.heartbeat(10);
        assert_eq!(wd.silence_ms(550), 50);
    }
}
