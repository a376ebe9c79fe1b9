//! # Summary
//!
//! The work simulated inside the critical section. The node drives a
//! fixed number of deterministic operations and hands the application the
//! completed evidence record to persist; implementations choose the step
//! values, the pacing, and the storage.

use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::message::NodeId;

/// One operation performed inside the critical section.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Step {
    /// Position within the entry, starting at 0.
    pub index: usize,

    /// Value contributed by this operation.
    pub value: i64,

    /// Running result after applying this operation.
    pub total: i64,

    /// Logical time at which the operation executed.
    pub timestamp: u64,
}

/// Durable record of one critical-section entry. Written for external
/// audit; consumed by nothing in-process.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evidence {
    pub node: NodeId,

    /// Wall-clock time the record was assembled.
    pub recorded_at: String,

    /// Logical clock after the final operation.
    pub clock: u64,

    /// Timestamp of the request this entry was admitted under.
    pub request: u64,

    pub steps: Vec<Step>,
    pub result: i64,
}

/// Application seam for the critical-section payload.
pub trait Workload: Send + Sync + 'static {
    /// Number of operations per critical-section entry.
    fn steps(&self) -> usize;

    /// Deterministic value of operation `index` on `node`.
    fn operation(&self, node: NodeId, index: usize) -> i64;

    /// Pause between consecutive operations.
    fn pace(&self) -> Duration;

    /// Persist the evidence record for one completed entry.
    fn record(&self, evidence: &Evidence) -> Result<(), Error>;
}
