use std::time::{Duration, Instant};

pub const TIMER_DEC_PER_SECOND: u32 = 60;
const MAX_CLOCK_HZ: u32 = 1_000_000;

#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    pub count: u8,
}

impl Timer {
    pub fn new(init_count: u8) -> Self {
        Self { count: init_count }
    }

    pub fn set(&mut self, value: u8) {
        self.count = value;
    }

    /// Counts down by one, stopping at zero.
    pub fn tick(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    pub fn is_active(&self) -> bool {
        self.count > 0
    }
}

/// Fixed-rate clock for the driver. Reports how many ticks have come due
/// since it was last asked, carrying the remainder forward so the long-run
/// rate stays exact regardless of how often it is polled.
#[derive(Debug)]
pub struct Clock {
    period: Duration,
    last: Instant,
}

impl Clock {
    pub fn new(hz: u32, start: Instant) -> Self {
        let hz = hz.clamp(1, MAX_CLOCK_HZ);
        Self {
            period: Duration::from_secs(1) / hz,
            last: start,
        }
    }

    pub fn due(&mut self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.last);
        let ticks = (elapsed.as_nanos() / self.period.as_nanos()) as u32;
        self.last += self.period * ticks;
        ticks
    }
}
