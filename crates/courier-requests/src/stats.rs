//! Counters for the request registry.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters of a [`RequestRegistry`](crate::RequestRegistry).
#[derive(Debug, Default)]
pub struct RequestStats {
    registered: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    unroutable: AtomicU64,
}

impl RequestStats {
    pub(crate) fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RequestStatsSnapshot {
        RequestStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStatsSnapshot {
    /// Requests accepted by the registry.
    pub registered: u64,
    /// Requests answered before their deadline.
    pub completed: u64,
    /// Requests whose deadline passed first.
    pub timed_out: u64,
    /// Responses dropped because no pending request matched.
    pub unroutable: u64,
}

impl RequestStatsSnapshot {
    /// Requests neither completed nor timed out yet.
    pub fn outstanding(&self) -> u64 {
        self.registered
            .saturating_sub(self.completed)
            .saturating_sub(self.timed_out)
    }
}
