use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Fault injection for simulated request/response delivery.
///
/// Nothing is ever lost: the engine does not retry, so a dropped response
/// would simply leave the list busy forever. Failures are modelled as error
/// completions instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Percentage of requests that complete with a network error.
    pub error_rate_percent: u8,
    /// Percentage of completions delivered twice.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of reversing a batch of simultaneously ready completions.
    pub reorder_rate_percent: u8,
    /// Percentage of push handshakes that fail.
    pub channel_failure_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: 20,
            max_latency_ms: 600,
            error_rate_percent: 5,
            duplicate_rate_percent: 3,
            reorder_rate_percent: 10,
            channel_failure_percent: 10,
        }
    }
}

impl FaultConfig {
    /// Same latencies, no injected failures.
    #[must_use]
    pub const fn calm(self) -> Self {
        Self {
            error_rate_percent: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            channel_failure_percent: 0,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Pending<T> {
    deliver_at: u64,
    /// Send order, to keep delivery stable among equal deadlines.
    order: u64,
    item: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub duplicated: bool,
    pub latency_ms: u64,
}

/// Deterministic delivery queue with random latency.
///
/// Random latencies alone reorder completions relative to send order; the
/// reorder fault additionally reverses batches that become ready together.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedNetwork<T> {
    pending: Vec<Pending<T>>,
    sent: u64,
    fault: FaultConfig,
}

impl<T: Clone> SimulatedNetwork<T> {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            sent: 0,
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    pub const fn set_fault_config(&mut self, fault: FaultConfig) {
        self.fault = fault;
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn next_delivery(&self) -> Option<u64> {
        self.pending.iter().map(|pending| pending.deliver_at).min()
    }

    /// Queue `item` for delivery after a random latency.
    pub fn send(&mut self, item: T, now: u64, rng: &mut DeterministicRng) -> SendOutcome {
        let latency_ms = rng.between(self.fault.min_latency_ms, self.fault.max_latency_ms);
        let deliver_at = now.saturating_add(latency_ms);
        let duplicated = rng.hit_rate_percent(self.fault.duplicate_rate_percent);
        if duplicated {
            let echo = rng.between(0, self.fault.max_latency_ms);
            self.push(item.clone(), deliver_at.saturating_add(echo));
        }
        self.push(item, deliver_at);
        SendOutcome {
            duplicated,
            latency_ms,
        }
    }

    fn push(&mut self, item: T, deliver_at: u64) {
        self.sent += 1;
        self.pending.push(Pending {
            deliver_at,
            order: self.sent,
            item,
        });
    }

    /// Remove and return everything due at `now`.
    pub fn deliver_ready(&mut self, now: u64, rng: &mut DeterministicRng) -> Vec<T> {
        let (mut ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.deliver_at <= now);
        self.pending = future;
        ready.sort_by_key(|pending| (pending.deliver_at, pending.order));
        if ready.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent) {
            ready.reverse();
        }
        ready.into_iter().map(|pending| pending.item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_delivered_early() {
        let mut rng = DeterministicRng::new(3);
        let mut network = SimulatedNetwork::new(FaultConfig {
            min_latency_ms: 100,
            max_latency_ms: 100,
            ..FaultConfig::default().calm()
        });
        network.send("a", 0, &mut rng);
        assert!(network.deliver_ready(99, &mut rng).is_empty());
        assert_eq!(network.deliver_ready(100, &mut rng), vec!["a"]);
        assert_eq!(network.pending_len(), 0);
    }

    #[test]
    fn later_send_can_arrive_first() {
        let mut rng = DeterministicRng::new(11);
        let mut network = SimulatedNetwork::new(FaultConfig::default().calm());
        let mut overtaken = false;
        for round in 0..200 {
            network.send(1, round * 1_000, &mut rng);
            network.send(2, round * 1_000 + 1, &mut rng);
            let delivered = network.deliver_ready(round * 1_000 + 10_000, &mut rng);
            overtaken |= delivered == vec![2, 1];
        }
        assert!(overtaken);
    }

    #[test]
    fn duplicates_are_delivered_twice() {
        let mut rng = DeterministicRng::new(5);
        let mut network = SimulatedNetwork::new(FaultConfig {
            duplicate_rate_percent: 100,
            ..FaultConfig::default().calm()
        });
        let outcome = network.send(7, 0, &mut rng);
        assert!(outcome.duplicated);
        assert_eq!(network.deliver_ready(u64::MAX, &mut rng), vec![7, 7]);
    }
}
