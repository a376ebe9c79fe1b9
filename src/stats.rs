//! # Summary
//!
//! Monotonic per-node counters, exposed externally as a read-only
//! `Statistics` snapshot that never blocks protocol progress.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::message::{NodeId, Statistics};

#[derive(Debug, Default)]
pub struct Stats {
    cs_entries: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    enter_at: Mutex<Option<String>>,
    exit_at: Mutex<Option<String>>,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    /// One protocol message successfully delivered to a peer.
    pub fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// One protocol message received from a peer.
    pub fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// The node entered the critical section at wall-clock time `at`.
    pub fn entered(&self, at: String) {
        self.cs_entries.fetch_add(1, Ordering::Relaxed);
        *self.enter_at.lock() = Some(at);
    }

    /// The node left the critical section at wall-clock time `at`.
    pub fn exited(&self, at: String) {
        *self.exit_at.lock() = Some(at);
    }

    pub fn snapshot(&self, node: NodeId, clock: u64) -> Statistics {
        Statistics {
            node,
            cs_entries: self.cs_entries.load(Ordering::Relaxed),
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_received: self.received.load(Ordering::Relaxed),
            clock,
            cs_enter_at: self.enter_at.lock().clone(),
            cs_exit_at: self.exit_at.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = Stats::new();
        stats.sent();
        stats.sent();
        stats.received();
        stats.entered("10:00:00.000".to_string());
        stats.exited("10:00:01.000".to_string());

        let snapshot = stats.snapshot(2, 17);
        assert_eq!(snapshot.node, 2);
        assert_eq!(snapshot.cs_entries, 1);
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.clock, 17);
        assert_eq!(snapshot.cs_enter_at.as_deref(), Some("10:00:00.000"));
        assert_eq!(snapshot.cs_exit_at.as_deref(), Some("10:00:01.000"));
    }

    #[test]
    fn snapshot_is_idempotent_while_quiet() {
        let stats = Stats::new();
        stats.sent();
        stats.received();
        assert_eq!(stats.snapshot(1, 3), stats.snapshot(1, 3));
    }
}
