//! Critical-section workload for the mutual-exclusion demonstration: a
//! fixed sequence of arithmetic operations, paced to simulate work, with
//! every completed entry persisted to the node's evidence file.

pub mod evidence;

use std::time::Duration;

use lamport::{Error, Evidence, NodeId, Workload};

use crate::evidence::Store;

/// Deterministic arithmetic performed while holding the critical section.
/// Operation `i` on node `n` contributes `n * 100 + i * 10` to the
/// running result.
pub struct Arithmetic {
    steps: usize,
    pace: Duration,
    store: Store<Evidence>,
}

impl Arithmetic {
    /// Standard workload: three operations, 300 ms apart, with evidence
    /// kept in `dir`.
    pub fn new<P: AsRef<std::path::Path>>(dir: P, node: NodeId) -> Result<Self, Error> {
        Ok(Arithmetic {
            steps: 3,
            pace: Duration::from_millis(300),
            store: Store::for_node(dir, node)?,
        })
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

impl Workload for Arithmetic {
    fn steps(&self) -> usize {
        self.steps
    }

    fn operation(&self, node: NodeId, index: usize) -> i64 {
        (node * 100 + index * 10) as i64
    }

    fn pace(&self) -> Duration {
        self.pace
    }

    fn record(&self, evidence: &Evidence) -> Result<(), Error> {
        self.store.save(evidence)
    }
}

#[cfg(test)]
mod tests {
    use lamport::Step;

    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{}-{}", name, std::process::id()))
    }

    fn sample(node: NodeId) -> Evidence {
        Evidence {
            node,
            recorded_at: "06/08/2026 10:00:00.000".to_string(),
            clock: 17,
            request: 9,
            steps: vec![
                Step { index: 0, value: 200, total: 200, timestamp: 14 },
                Step { index: 1, value: 210, total: 410, timestamp: 15 },
                Step { index: 2, value: 220, total: 630, timestamp: 16 },
            ],
            result: 630,
        }
    }

    #[test]
    fn operations_are_deterministic() {
        let dir = scratch("arithmetic-ops");
        std::fs::create_dir_all(&dir).unwrap();
        let workload = Arithmetic::new(&dir, 2).unwrap();

        assert_eq!(workload.steps(), 3);
        assert_eq!(workload.operation(2, 0), 200);
        assert_eq!(workload.operation(2, 1), 210);
        assert_eq!(workload.operation(2, 2), 220);
        assert_eq!(workload.operation(1, 0), 100);

        let total: i64 = (0..workload.steps())
            .map(|index| workload.operation(1, index))
            .sum();
        assert_eq!(total, 330);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn evidence_survives_a_round_trip() {
        let path = scratch("evidence-roundtrip.lamport");
        let store: Store<Evidence> = Store::new(&path).unwrap();

        let record = sample(2);
        store.save(&record).unwrap();
        assert_eq!(store.load(), Some(record));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn save_replaces_the_previous_record() {
        let path = scratch("evidence-replace.lamport");
        let store: Store<Evidence> = Store::new(&path).unwrap();

        store.save(&sample(1)).unwrap();
        store.save(&sample(3)).unwrap();
        assert_eq!(store.load().map(|record: Evidence| record.node), Some(3));

        let _ = std::fs::remove_file(path);
    }
}
