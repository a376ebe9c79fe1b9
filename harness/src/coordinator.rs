//! Coordinator half of the harness: waits for liveness, waits for every
//! node to finish its cycle, collects statistics, verifies the run, and
//! shuts the cluster down.

use std::time::Duration;

use chrono::NaiveTime;
use log::{info, warn};
use serde_derive::Serialize;

use lamport::{Error, NodeId, Peers, Request, Response, Statistics, Transport};

const POLL: Duration = Duration::from_millis(500);
const STARTUP_CAP: Duration = Duration::from_secs(30);
const TIME_FORMAT: &str = "%H:%M:%S%.3f";

pub struct Coordinator {
    peers: Peers,
    count: usize,
}

/// Aggregated outcome of one simulation, also written to disk as JSON.
#[derive(Serialize)]
pub struct Report {
    pub nodes: Vec<Statistics>,
    pub total_cs_entries: u64,
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
    pub expected_messages_per_node: u64,
    pub message_volume_ok: bool,
    pub mutual_exclusion_ok: bool,
}

impl Coordinator {
    pub fn new(base_port: u16, count: usize) -> Self {
        Coordinator {
            peers: Peers::new(base_port),
            count,
        }
    }

    async fn statistics(&self, node: NodeId) -> Result<Statistics, Error> {
        match self.peers.call(node, Request::Statistics).await? {
            Response::Statistics(statistics) => Ok(statistics),
            response => Err(Error::Unexpected(response)),
        }
    }

    /// Block until every node answers a ping, or give up after 30 s.
    pub async fn wait_for_nodes(&self) -> Result<(), Error> {
        info!("waiting for all nodes to start");
        let deadline = tokio::time::Instant::now() + STARTUP_CAP;
        let mut ready = vec![false; self.count + 1];
        loop {
            for node in 1..=self.count {
                if ready[node] {
                    continue;
                }
                if let Ok(Response::Alive { node: id }) =
                    self.peers.call(node, Request::Ping).await
                {
                    info!("node-{} is ready", id);
                    ready[node] = true;
                }
            }
            if ready[1..].iter().all(|ready| *ready) {
                info!("all nodes are ready");
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "nodes did not start in time",
                )));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Poll until every node reports a completed cycle. The cap scales
    /// with cluster size, generously above the staggered request delays.
    pub async fn wait_for_cycles(&self) -> Result<(), Error> {
        info!("waiting for critical-section cycles to complete");
        let cap = Duration::from_secs(30 + 3 * self.count as u64);
        let deadline = tokio::time::Instant::now() + cap;
        loop {
            let mut complete = 0;
            for node in 1..=self.count {
                if let Ok(statistics) = self.statistics(node).await {
                    if statistics.cs_entries >= 1 {
                        complete += 1;
                    }
                }
            }
            if complete == self.count {
                info!("all cycles complete");
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "cycles did not complete in time",
                )));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    pub async fn collect(&self) -> Vec<Statistics> {
        let mut all = Vec::new();
        for node in 1..=self.count {
            match self.statistics(node).await {
                Ok(statistics) => {
                    info!(
                        "node-{}: cs_entries={} sent={} received={} clock={}",
                        statistics.node,
                        statistics.cs_entries,
                        statistics.messages_sent,
                        statistics.messages_received,
                        statistics.clock,
                    );
                    all.push(statistics);
                }
                Err(error) => {
                    warn!("failed to collect statistics from node-{}: {}", node, error)
                }
            }
        }
        all
    }

    /// Aggregate the collected statistics and verify the run.
    pub fn report(&self, nodes: Vec<Statistics>) -> Report {
        let total_cs_entries = nodes.iter().map(|s| s.cs_entries).sum();
        let total_messages_sent = nodes.iter().map(|s| s.messages_sent).sum();
        let total_messages_received = nodes.iter().map(|s| s.messages_received).sum();

        // One cycle per node: N-1 REQUESTs, N-1 RELEASEs, and one REPLY
        // for every foreign request.
        let expected_messages_per_node = 3 * (self.count as u64 - 1);
        let message_volume_ok = nodes.len() == self.count
            && nodes.iter().all(|s| {
                s.messages_sent == expected_messages_per_node
                    && s.messages_received == expected_messages_per_node
            });
        let mutual_exclusion_ok = intervals_disjoint(&nodes);

        info!("==== final report ====");
        for s in &nodes {
            info!(
                "node-{}: cs_entries={} sent={} received={} clock={} cs=[{} .. {}]",
                s.node,
                s.cs_entries,
                s.messages_sent,
                s.messages_received,
                s.clock,
                s.cs_enter_at.as_deref().unwrap_or("-"),
                s.cs_exit_at.as_deref().unwrap_or("-"),
            );
        }
        info!(
            "totals: cs_entries={} sent={} received={} (expected {} per node)",
            total_cs_entries,
            total_messages_sent,
            total_messages_received,
            expected_messages_per_node,
        );
        if mutual_exclusion_ok {
            info!("mutual exclusion verified: no overlapping critical sections");
        } else {
            warn!("possible critical-section overlap detected");
        }
        if message_volume_ok {
            info!("message volume verified");
        } else {
            warn!("message volume differs from expectation");
        }

        Report {
            nodes,
            total_cs_entries,
            total_messages_sent,
            total_messages_received,
            expected_messages_per_node,
            message_volume_ok,
            mutual_exclusion_ok,
        }
    }

    pub async fn shutdown(&self) {
        info!("shutting down all nodes");
        for node in 1..=self.count {
            match self.peers.call(node, Request::Shutdown).await {
                Ok(Response::Shutdown) => info!("shutdown acknowledged by node-{}", node),
                Ok(response) => warn!(
                    "unexpected shutdown response from node-{}: {:?}",
                    node, response,
                ),
                Err(error) => warn!("failed to shut down node-{}: {}", node, error),
            }
        }
    }
}

/// True when no two reported critical-section intervals overlap. Assumes
/// the whole run happens within one day.
fn intervals_disjoint(nodes: &[Statistics]) -> bool {
    let mut intervals = Vec::new();
    for s in nodes {
        let (enter, exit) = match (s.cs_enter_at.as_deref(), s.cs_exit_at.as_deref()) {
            (Some(enter), Some(exit)) => (enter, exit),
            _ => continue,
        };
        match (
            NaiveTime::parse_from_str(enter, TIME_FORMAT),
            NaiveTime::parse_from_str(exit, TIME_FORMAT),
        ) {
            (Ok(enter), Ok(exit)) => intervals.push((enter, exit)),
            _ => return false,
        }
    }
    intervals.sort();
    intervals
        .windows(2)
        .all(|pair| pair[0].1 <= pair[1].0)
}
