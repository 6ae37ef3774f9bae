//! Clocks report seconds since the Unix epoch as `f64`, the unit the request
//! log is keyed on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// Wall clock that never repeats itself.
///
/// The request log rejects two records for one user with the same timestamp,
/// so successive readings are forced strictly upward even if the system
/// clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());

        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            // Non-negative floats order the same as their bit patterns, so
            // bits + 1 is the next representable value.
            let next = if wall > f64::from_bits(prev) {
                wall
            } else {
                f64::from_bits(prev + 1)
            };

            match self.last.compare_exchange_weak(
                prev,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Manually driven clock for simulated time.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `start` seconds since the epoch.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::Release);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.advance_secs(by.as_secs_f64());
    }

    /// Move the clock forward by fractional seconds.
    pub fn advance_secs(&self, secs: f64) {
        let now = f64::from_bits(self.bits.load(Ordering::Acquire));
        self.set(now + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_strictly_increasing() {
        let clock = SystemClock::new();
        let mut prev = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_system_clock_is_wall_time() {
        let clock = SystemClock::new();
        // 2020-01-01
        assert!(clock.now() > 1_577_836_800.0);
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(1_000.0);
        let other = clock.clone();

        clock.advance(Duration::from_secs(61));
        assert!((other.now() - 1_061.0).abs() < f64::EPSILON);

        other.set(5.5);
        assert!((clock.now() - 5.5).abs() < f64::EPSILON);
    }
}
