use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Time primitives
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Time(pub f64); // seconds

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn from_millis(ms: f64) -> Self {
        Time(ms / 1000.0)
    }

    pub fn as_millis(self) -> f64 {
        self.0 * 1000.0
    }

    /// Milliseconds elapsed since `earlier`, clamped at zero.
    pub fn millis_since(self, earlier: Time) -> f64 {
        ((self.0 - earlier.0) * 1000.0).max(0.0)
    }
}

/// Source of "now" for animation time bases.
pub trait Clock: Send + Sync {
    fn now(&self) -> Time;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Time {
        Time(self.origin.elapsed().as_secs_f64())
    }
}

/// Clock advanced by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Time) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    pub fn set(&self, t: Time) {
        self.bits.store(t.0.to_bits(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Time {
        Time(f64::from_bits(self.bits.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock, Time};

    #[test]
    fn millis_since_never_negative() {
        let a = Time(1.5);
        let b = Time(2.0);
        assert_eq!(b.millis_since(a), 500.0);
        assert_eq!(a.millis_since(b), 0.0);
        assert_eq!(Time::from_millis(250.0).as_millis(), 250.0);
    }

    #[test]
    fn manual_clock_clones_share_reading() {
        let clock = ManualClock::new(Time(1.0));
        let other = clock.clone();
        other.set(Time(3.5));
        assert_eq!(clock.now(), Time(3.5));
    }
}
