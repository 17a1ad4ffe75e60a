//! Single-slot debounce timer.
//!
//! At most one action is pending. Scheduling a new action cancels the old one,
//! so a burst of keystrokes collapses into a single action that fires once the
//! input has been quiet for the configured delay.

/// Counters for one debouncer, mostly for tests and the simulation oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DebounceStats {
    pub scheduled: u64,
    /// Pending actions dropped by a later `schedule` or an explicit `cancel`.
    pub cancelled: u64,
    pub fired: u64,
}

#[derive(Debug)]
struct Pending<A> {
    action: A,
    due_at: u64,
}

/// Debounce scheduler driven by an external clock.
#[derive(Debug)]
pub struct Debouncer<A> {
    pending: Option<Pending<A>>,
    stats: DebounceStats,
}

impl<A> Debouncer<A> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: None,
            stats: DebounceStats {
                scheduled: 0,
                cancelled: 0,
                fired: 0,
            },
        }
    }

    /// Replace any pending action with `action`, due `delay_ms` after `now`.
    pub fn schedule(&mut self, action: A, delay_ms: u64, now: u64) {
        if self.pending.is_some() {
            self.stats.cancelled += 1;
        }
        self.stats.scheduled += 1;
        self.pending = Some(Pending {
            action,
            due_at: now.saturating_add(delay_ms),
        });
    }

    /// Drop the pending action. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        let had = self.pending.take().is_some();
        if had {
            self.stats.cancelled += 1;
        }
        had
    }

    /// Take the pending action if its deadline has passed.
    pub fn poll(&mut self, now: u64) -> Option<A> {
        if self.pending.as_ref()?.due_at > now {
            return None;
        }
        let pending = self.pending.take()?;
        self.stats.fired += 1;
        Some(pending.action)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|pending| pending.due_at)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub const fn stats(&self) -> DebounceStats {
        self.stats
    }
}

impl<A> Default for Debouncer<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_quiet_period() {
        let mut debouncer = Debouncer::new();
        debouncer.schedule("refresh", 250, 0);
        assert_eq!(debouncer.poll(249), None);
        assert_eq!(debouncer.poll(250), Some("refresh"));
        assert_eq!(debouncer.poll(1_000), None);
    }

    #[test]
    fn burst_collapses_into_last_action() {
        let mut debouncer = Debouncer::new();
        for (at, key) in [(0, 'p'), (80, 'r'), (160, 'i')] {
            debouncer.schedule(key, 250, at);
        }
        assert_eq!(debouncer.next_deadline(), Some(410));
        assert_eq!(debouncer.poll(409), None);
        assert_eq!(debouncer.poll(410), Some('i'));

        let stats = debouncer.stats();
        assert_eq!(stats.scheduled, 3);
        assert_eq!(stats.cancelled, 2);
        assert_eq!(stats.fired, 1);
    }

    #[test]
    fn cancel_is_exact() {
        let mut debouncer = Debouncer::new();
        debouncer.schedule((), 250, 0);
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(10_000), None);
    }

    #[test]
    fn zero_delay_is_due_immediately() {
        let mut debouncer = Debouncer::new();
        debouncer.schedule(1, 0, 42);
        assert_eq!(debouncer.poll(42), Some(1));
    }
}
