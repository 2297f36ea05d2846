use std::time::{Duration, Instant};

/// Time source for scheduling and decode-time measurement.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Single-shot timer. At most one deadline is pending; stopping it guarantees
/// it will not fire.
#[derive(Debug, Clone, Default)]
pub struct FrameTimer {
    deadline: Option<Instant>,
}

impl FrameTimer {
    /// Arm (or re-arm) the timer `delay_ms` after `now`.
    pub fn start(&mut self, now: Instant, delay_ms: u32) {
        self.deadline = Some(now + Duration::from_millis(u64::from(delay_ms)));
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return true if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
