// Token-bucket throttle consulted once per row.

use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Throttle {
    per_second: f64,
    capacity: f64,
    tokens: f64,
    last: Option<Instant>,
}

impl Throttle {
    /// `per_second <= 0` disables throttling. The bucket starts full.
    pub fn new(per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Throttle {
            per_second: per_second.max(0.0),
            capacity,
            tokens: capacity,
            last: None,
        }
    }

    pub fn unlimited() -> Self {
        Throttle::new(0.0, 1)
    }

    pub fn is_unlimited(&self) -> bool {
        self.per_second == 0.0
    }

    /// Take one token at `now` and return how long the caller must wait
    /// before using it. The balance may go negative; later calls pay it back.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        }
        self.last = Some(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            // tiny rates overflow `Duration`; treat them as "never"
            Duration::try_from_secs_f64(-self.tokens / self.per_second).unwrap_or(Duration::MAX)
        }
    }

    /// Block until a token is available.
    pub fn acquire(&mut self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}
