//! Fixed-cadence telemetry scheduling.
//!
//! The schedule depends only on the clock, never on command traffic: a pass
//! that drained a burst of commands still emits when the deadline is due,
//! and a pass with no input emits all the same. If the loop falls more than
//! one period behind, the deadline is re-based to `now + period` instead of
//! emitting a burst of catch-up frames.

pub const DEFAULT_PERIOD_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct TelemetryScheduler {
    period_ms: u64,
    next_due_ms: Option<u64>,
    next_seq: u32,
}

impl TelemetryScheduler {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due_ms: None,
            next_seq: 0,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Returns the sequence number to stamp on a frame when one is due at
    /// `now_ms`, advancing the schedule. The first call is always due.
    pub fn poll(&mut self, now_ms: u64) -> Option<u32> {
        let next_due = match self.next_due_ms {
            None => now_ms + self.period_ms,
            Some(due) if now_ms < due => return None,
            Some(due) if now_ms >= due + self.period_ms => now_ms + self.period_ms,
            Some(due) => due + self.period_ms,
        };
        self.next_due_ms = Some(next_due);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        Some(seq)
    }
}

impl Default for TelemetryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_emits_and_then_waits_a_period() {
        let mut s = TelemetryScheduler::new(100);
        assert_eq!(s.poll(0), Some(0));
        assert_eq!(s.poll(50), None);
        assert_eq!(s.poll(99), None);
        assert_eq!(s.poll(100), Some(1));
    }

    #[test]
    fn jitter_does_not_drift_the_schedule() {
        let mut s = TelemetryScheduler::new(100);
        s.poll(0);
        assert_eq!(s.poll(130), Some(1));
        // Deadline stays on the 100 ms grid.
        assert_eq!(s.poll(199), None);
        assert_eq!(s.poll(200), Some(2));
    }

    #[test]
    fn long_stall_rebases_instead_of_bursting() {
        let mut s = TelemetryScheduler::new(100);
        s.poll(0);
        assert_eq!(s.poll(1000), Some(1));
        assert_eq!(s.poll(1001), None);
        assert_eq!(s.poll(1099), None);
        assert_eq!(s.poll(1100), Some(2));
    }
}
