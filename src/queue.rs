//! # Summary
//!
//! The ordered request queue: at most one outstanding claim per node,
//! totally ordered by `(timestamp, node)`. The head of this order decides
//! which pending requester may enter the critical section next.

use hashbrown::HashMap as Map;
use parking_lot::Mutex;

use crate::message::NodeId;

/// A pending claim on the critical section.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    pub timestamp: u64,
    pub node: NodeId,
}

/// Outstanding claims keyed by node. Mutated concurrently by inbound
/// handlers while the owning node reads the head, so every operation takes
/// the internal lock. Head lookup is a linear scan, which is fine at this
/// scale.
#[derive(Debug, Default)]
pub struct Queue(Mutex<Map<NodeId, u64>>);

impl Queue {
    pub fn new() -> Self {
        Queue::default()
    }

    /// Insert `node`'s claim, replacing any previous one.
    pub fn upsert(&self, node: NodeId, timestamp: u64) {
        self.0.lock().insert(node, timestamp);
    }

    /// Drop `node`'s claim, if present.
    pub fn remove(&self, node: NodeId) {
        self.0.lock().remove(&node);
    }

    /// The minimum claim under `(timestamp, node)` order.
    pub fn min(&self) -> Option<Entry> {
        self.0
            .lock()
            .iter()
            .map(|(&node, &timestamp)| Entry { timestamp, node })
            .min()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.lock().contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// All claims in admission order, for progress logging.
    pub fn snapshot(&self) -> Vec<Entry> {
        let mut entries: Vec<_> = self
            .0
            .lock()
            .iter()
            .map(|(&node, &timestamp)| Entry { timestamp, node })
            .collect();
        entries.sort();
        entries
    }
}
