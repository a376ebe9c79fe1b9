//! # Summary
//!
//! Acknowledgement tracking for the current request episode. Admission
//! requires a reply from every other participant (unanimity, not a
//! majority), so the tracker is just the set of node ids seen since the
//! last reset.

use hashbrown::HashSet as Set;
use parking_lot::Mutex;

use crate::message::NodeId;

/// Peers that have acknowledged the outstanding request. Contents are
/// scoped to one episode and discarded at the next.
#[derive(Debug, Default)]
pub struct Replies(Mutex<Set<NodeId>>);

impl Replies {
    pub fn new() -> Self {
        Replies::default()
    }

    /// Discard acknowledgements from a previous episode.
    pub fn reset(&self) {
        self.0.lock().clear();
    }

    /// Record an acknowledgement and return the count collected so far.
    pub fn record(&self, node: NodeId) -> usize {
        let mut set = self.0.lock();
        set.insert(node);
        set.len()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    /// True once all `peers` other participants have acknowledged.
    pub fn has_quorum(&self, peers: usize) -> bool {
        self.0.lock().len() == peers
    }
}
