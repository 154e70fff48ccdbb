use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Deadline after which the owning process should exit.
///
/// Armed by the checkpoint sequence after a clean stop or the final save; the
/// process main loop polls [`is_due`](Self::is_due).
#[derive(Debug, Default)]
pub struct ShutdownTimer {
    close_at: Mutex<Option<Instant>>,
}

impl ShutdownTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit `delay` from now, replacing any earlier deadline.
    pub fn schedule(&self, delay: Duration) {
        *self.close_at.lock() = Some(Instant::now() + delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.close_at.lock()
    }

    pub fn is_due(&self) -> bool {
        self.deadline().is_some_and(|at| at <= Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscheduled_is_never_due() {
        let t = ShutdownTimer::new();
        assert!(t.deadline().is_none());
        assert!(!t.is_due());
    }

    #[test]
    fn becomes_due_after_delay() {
        let t = ShutdownTimer::new();
        t.schedule(Duration::from_millis(10));
        assert!(!t.is_due());
        std::thread::sleep(Duration::from_millis(20));
        assert!(t.is_due());
    }

    #[test]
    fn reschedule_replaces_deadline() {
        let t = ShutdownTimer::new();
        t.schedule(Duration::ZERO);
        t.schedule(Duration::from_secs(3600));
        assert!(!t.is_due());
    }
}
