//! Time sources for timers and deadline countdowns.
//!
//! The engine never reads the system time directly. Monotonic milliseconds
//! drive the debounce and reconnect timers; wall time is only used to render
//! deadline countdowns.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Injected time source.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_millis(&self) -> u64;

    /// Current wall-clock time.
    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Real clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
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
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Hand-advanced clock for tests and simulation.
///
/// Clones share the same time, so a test can keep one handle while the engine
/// owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
    wall_base: DateTime<Utc>,
}

impl ManualClock {
    /// Create a clock at monotonic time zero whose wall time starts at `wall_base`.
    #[must_use]
    pub fn new(wall_base: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            wall_base,
        }
    }

    /// Move time forward.
    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().saturating_add(millis));
    }

    /// Jump to an absolute monotonic time. Going backwards is ignored.
    pub fn set(&self, millis: u64) {
        if millis > self.now.get() {
            self.now.set(millis);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let elapsed = i64::try_from(self.now.get()).unwrap_or(i64::MAX);
        self.wall_base + Duration::milliseconds(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let handle = clock.clone();
        handle.advance(250);
        assert_eq!(clock.now_millis(), 250);
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::default();
        clock.set(1_000);
        clock.set(10);
        assert_eq!(clock.now_millis(), 1_000);
    }

    #[test]
    fn manual_wall_time_tracks_monotonic_time() {
        let base = DateTime::parse_from_rfc3339("2024-03-01T08:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        let clock = ManualClock::new(base);
        clock.advance(90_000);
        assert_eq!(clock.wall_time(), base + Duration::seconds(90));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }
}
