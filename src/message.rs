//! # Summary
//!
//! Wire schema shared by every node and the coordinator. Each remote
//! operation is one `Request` variant answered by exactly one `Response`
//! variant, so a mismatched field fails at decode time instead of
//! silently.

use serde_derive::{Deserialize, Serialize};

/// Participant ordinal. Node `i` of `N` listens at `base_port + i`.
pub type NodeId = usize;

/// Operations a node accepts from its peers and from the coordinator.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// `node` asks to enter the critical section at `timestamp`.
    Request { node: NodeId, timestamp: u64 },

    /// `node` acknowledges the request it observed at `request`;
    /// `timestamp` is the replier's own clock at the time of the reply.
    Reply { node: NodeId, timestamp: u64, request: u64 },

    /// `node` has left the critical section.
    Release { node: NodeId, timestamp: u64 },

    /// Liveness probe.
    Ping,

    /// Read-only statistics snapshot.
    Statistics,

    /// Begin graceful termination.
    Shutdown,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Acknowledgement carrying the receiver's clock after the merge.
    Ok { timestamp: u64 },

    /// Answer to `Ping`.
    Alive { node: NodeId },

    /// Answer to `Statistics`.
    Statistics(Statistics),

    /// Answer to `Shutdown`.
    Shutdown,
}

/// Read-only snapshot of one node's counters.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub node: NodeId,
    pub cs_entries: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub clock: u64,
    pub cs_enter_at: Option<String>,
    pub cs_exit_at: Option<String>,
}
