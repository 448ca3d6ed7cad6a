//! Wall-clock deadlines
//!
//! One type covers every timed wait on the bus: the per-address scan
//! window, the acknowledgement wait and the harness transmit/report
//! pacing.

use std::time::{Duration, Instant};

/// A start time plus a duration
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    duration: Duration,
}

impl Deadline {
    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Self {
            start: Instant::now(),
            duration,
        }
    }

    /// Returns true once the duration has elapsed
    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.duration
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.start.elapsed())
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Start the same duration over from now
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    /// Periodic use: if expired, restart and return true
    pub fn check(&mut self) -> bool {
        if self.expired() {
            self.restart();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_zero_duration_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_expires_after_duration() {
        let deadline = Deadline::after(Duration::from_millis(20));
        assert!(!deadline.expired());
        assert!(deadline.remaining() <= Duration::from_millis(20));
        sleep(Duration::from_millis(30));
        assert!(deadline.expired());
    }

    #[test]
    fn test_check_restarts() {
        let mut timer = Deadline::after(Duration::from_millis(10));
        assert!(!timer.check());
        sleep(Duration::from_millis(15));
        assert!(timer.check());
        assert!(!timer.expired());
        assert_eq!(timer.duration(), Duration::from_millis(10));
    }
}
