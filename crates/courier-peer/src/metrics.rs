//! Counters for the dispatch orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters updated by the dispatcher.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Raw messages handed over by the transport
    pub messages_received: AtomicU64,
    /// Messages that deserialized and were dispatched
    pub packets_dispatched: AtomicU64,
    /// Messages (or hails) that failed to deserialize
    pub deserialization_failures: AtomicU64,
    /// Callbacks that returned an error or panicked
    pub callback_failures: AtomicU64,
    /// Connection requests approved
    pub connections_approved: AtomicU64,
    /// Connection requests denied, for any reason
    pub connections_denied: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            packets_dispatched: self.packets_dispatched.load(Ordering::Relaxed),
            deserialization_failures: self.deserialization_failures.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            connections_approved: self.connections_approved.load(Ordering::Relaxed),
            connections_denied: self.connections_denied.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages_received: u64,
    pub packets_dispatched: u64,
    pub deserialization_failures: u64,
    pub callback_failures: u64,
    pub connections_approved: u64,
    pub connections_denied: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = DispatchMetrics::new();
        DispatchMetrics::incr(&metrics.messages_received);
        DispatchMetrics::incr(&metrics.messages_received);
        DispatchMetrics::add(&metrics.callback_failures, 3);

        let stats = metrics.snapshot();
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.callback_failures, 3);
        assert_eq!(stats.connections_denied, 0);
    }
}
