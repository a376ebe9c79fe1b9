//! # Summary
//!
//! The per-node protocol state machine: clock maintenance, the ordered
//! request queue, reply-quorum tracking, and the critical-section
//! admission/exit sequence. Inbound handlers run concurrently with the
//! node's own cycle and are stateless with respect to it; each piece of
//! shared state carries its own lock.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time;

use crate::clock::Clock;
use crate::error::Error;
use crate::message;
use crate::message::NodeId;
use crate::peers::Transport;
use crate::queue::Queue;
use crate::replies::Replies;
use crate::stats::Stats;
use crate::workload::{Evidence, Step, Workload};

/// Upper bound on in-flight sends within one broadcast.
const BROADCAST_LIMIT: usize = 8;

/// Wall-clock format for statistics and the critical-section lines.
const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Wall-clock format for evidence records.
const STAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.3f";

/// The node's own intent to enter the critical section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Requesting,
    AwaitingEntry,
    InCriticalSection,
}

pub struct Node<T> {
    id: NodeId,
    count: usize,
    transport: T,
    clock: Clock,
    queue: Queue,
    replies: Replies,
    stats: Stats,
    phase: Mutex<Phase>,

    /// Timestamp of the currently outstanding request, if any. Guards the
    /// reply tracker against acknowledgements for a superseded episode.
    outstanding: Mutex<Option<u64>>,

    /// Signalled whenever a reply or release may have changed the entry
    /// condition.
    entry: Notify,

    stopping: AtomicBool,
    stopped: Notify,
}

impl<T: Transport> Node<T> {
    pub fn new(id: NodeId, count: usize, transport: T) -> Self {
        info!("[node-{}] initialized ({} participants)", id, count);
        Node {
            id,
            count,
            transport,
            clock: Clock::new(),
            queue: Queue::new(),
            replies: Replies::new(),
            stats: Stats::new(),
            phase: Mutex::new(Phase::Idle),
            outstanding: Mutex::new(None),
            entry: Notify::new(),
            stopping: AtomicBool::new(false),
            stopped: Notify::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    // ==================== Inbound handlers ====================

    /// REQUEST from `from`: order the claim, then acknowledge with a fresh
    /// timestamp. The REPLY goes out on its own task so a slow peer cannot
    /// stall this handler.
    pub fn on_request(self: &Arc<Self>, from: NodeId, timestamp: u64) -> u64 {
        self.stats.received();
        self.clock.merge(timestamp);
        self.queue.upsert(from, timestamp);
        debug!("[node-{}] REQUEST from node-{} (ts {})", self.id, from, timestamp);

        let reply = self.clock.tick();
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let message = message::Request::Reply {
                node: node.id,
                timestamp: reply,
                request: timestamp,
            };
            node.dispatch(from, message).await;
        });
        reply
    }

    /// REPLY from `from` acknowledging the request issued at `request`.
    /// Acknowledgements for a superseded episode are dropped.
    pub fn on_reply(&self, from: NodeId, timestamp: u64, request: u64) -> u64 {
        self.stats.received();
        let merged = self.clock.merge(timestamp);
        if *self.outstanding.lock() == Some(request) {
            let collected = self.replies.record(from);
            debug!(
                "[node-{}] REPLY from node-{} ({}/{})",
                self.id,
                from,
                collected,
                self.count - 1,
            );
            self.entry.notify_waiters();
        } else {
            debug!(
                "[node-{}] stale REPLY from node-{} for ts {}",
                self.id, from, request,
            );
        }
        merged
    }

    /// RELEASE from `from`: drop its claim.
    pub fn on_release(&self, from: NodeId, timestamp: u64) -> u64 {
        self.stats.received();
        let merged = self.clock.merge(timestamp);
        self.queue.remove(from);
        debug!("[node-{}] RELEASE from node-{}", self.id, from);
        self.entry.notify_waiters();
        merged
    }

    /// Read-only snapshot; never blocks protocol progress.
    pub fn statistics(&self) -> message::Statistics {
        self.stats.snapshot(self.id, self.clock.read())
    }

    /// Raise the node's shutdown signal. The run loop terminates once any
    /// in-flight cycle has finished.
    pub fn begin_shutdown(&self) {
        info!("[node-{}] shutdown requested", self.id);
        self.stopping.store(true, Ordering::SeqCst);
        self.stopped.notify_waiters();
    }

    /// Wait for `begin_shutdown`.
    pub async fn await_shutdown(&self) {
        loop {
            let stopped = self.stopped.notified();
            tokio::pin!(stopped);
            stopped.as_mut().enable();
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
            stopped.await;
        }
    }

    // ==================== Own intent ====================

    /// One full request, enter, exit cycle.
    pub async fn run_cycle<W: Workload>(self: &Arc<Self>, workload: &W) -> Result<(), Error> {
        let request = self.request_cs().await;
        self.await_entry().await;
        self.enter_cs(request, workload).await?;
        self.exit_cs().await;
        Ok(())
    }

    /// Stamp a fresh request, insert it locally, and broadcast it. Returns
    /// the request timestamp.
    pub async fn request_cs(&self) -> u64 {
        self.transition(Phase::Idle, Phase::Requesting);
        self.replies.reset();

        let timestamp = self.clock.tick();
        *self.outstanding.lock() = Some(timestamp);
        self.queue.upsert(self.id, timestamp);
        info!(
            "[node-{}] requesting critical section (ts {}, queue {:?})",
            self.id,
            timestamp,
            self.queue.snapshot(),
        );

        let request = message::Request::Request { node: self.id, timestamp };
        self.broadcast(request).await;
        self.transition(Phase::Requesting, Phase::AwaitingEntry);
        timestamp
    }

    /// Block until every other participant has acknowledged the current
    /// request and our claim is the queue head. No timeout and no
    /// cancellation: a lost reply or release leaves the node waiting until
    /// it is externally terminated.
    pub async fn await_entry(&self) {
        loop {
            let changed = self.entry.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.admissible() {
                debug!("[node-{}] quorum and queue head reached", self.id);
                return;
            }
            changed.await;
        }
    }

    fn admissible(&self) -> bool {
        self.replies.has_quorum(self.count - 1)
            && self.queue.min().map_or(false, |head| head.node == self.id)
    }

    /// Execute the payload with the critical section held, then persist
    /// the evidence record for this entry.
    pub async fn enter_cs<W: Workload>(&self, request: u64, workload: &W) -> Result<(), Error> {
        self.transition(Phase::AwaitingEntry, Phase::InCriticalSection);
        let entered_at = chrono::Local::now().format(TIME_FORMAT).to_string();
        self.stats.entered(entered_at.clone());
        let entered = self.clock.tick();
        info!(
            "[node-{}] entering critical section at {} (ts {})",
            self.id, entered_at, entered,
        );

        let mut steps = Vec::with_capacity(workload.steps());
        let mut result = 0i64;
        for index in 0..workload.steps() {
            let timestamp = self.clock.tick();
            let value = workload.operation(self.id, index);
            result += value;
            steps.push(Step { index, value, total: result, timestamp });
            time::sleep(workload.pace()).await;
        }
        let finished = self.clock.tick();

        let evidence = Evidence {
            node: self.id,
            recorded_at: chrono::Local::now().format(STAMP_FORMAT).to_string(),
            clock: finished,
            request,
            steps,
            result,
        };
        workload.record(&evidence)?;

        // One record per emission keeps the block contiguous when several
        // nodes share a log sink.
        let mut block = String::new();
        for step in &evidence.steps {
            let _ = writeln!(
                block,
                "[node-{}] operation {}: +{} = {} [ts {}]",
                self.id,
                step.index + 1,
                step.value,
                step.total,
                step.timestamp,
            );
        }
        let _ = write!(
            block,
            "[node-{}] work complete: result {} [ts {}]",
            self.id, evidence.result, finished,
        );
        info!("{}", block);
        Ok(())
    }

    /// Leave the critical section and let every peer drop our claim.
    pub async fn exit_cs(&self) {
        let exited_at = chrono::Local::now().format(TIME_FORMAT).to_string();
        self.stats.exited(exited_at.clone());
        let timestamp = self.clock.tick();
        info!(
            "[node-{}] exiting critical section at {} (ts {})",
            self.id, exited_at, timestamp,
        );

        self.transition(Phase::InCriticalSection, Phase::Idle);
        *self.outstanding.lock() = None;
        self.queue.remove(self.id);
        let release = message::Request::Release { node: self.id, timestamp };
        self.broadcast(release).await;
    }

    // ==================== Outbound plumbing ====================

    /// Send `message` to every other participant, at most `BROADCAST_LIMIT`
    /// in flight at once. Failures are independent per peer and never
    /// retried.
    async fn broadcast(&self, message: message::Request) {
        let peers = (1..=self.count).filter(|peer| *peer != self.id);
        futures::stream::iter(peers)
            .for_each_concurrent(BROADCAST_LIMIT, |peer| {
                let message = message.clone();
                async move { self.dispatch(peer, message).await }
            })
            .await;
    }

    /// One request/response exchange with `peer`. A failure is logged and
    /// otherwise ignored.
    async fn dispatch(&self, peer: NodeId, message: message::Request) {
        match self.transport.call(peer, message).await {
            Ok(message::Response::Ok { timestamp }) => {
                self.stats.sent();
                self.clock.merge(timestamp);
            }
            Ok(response) => warn!(
                "[node-{}] unexpected response from node-{}: {:?}",
                self.id, peer, response,
            ),
            Err(error) => warn!(
                "[node-{}] failed to reach node-{}: {}",
                self.id, peer, error,
            ),
        }
    }

    fn transition(&self, from: Phase, to: Phase) {
        let mut phase = self.phase.lock();
        debug_assert_eq!(*phase, from);
        debug!("[node-{}] {:?} -> {:?}", self.id, *phase, to);
        *phase = to;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;

    /// Transport double that records every call and acknowledges with a
    /// zero timestamp.
    struct Recorder {
        tx: mpsc::UnboundedSender<(NodeId, message::Request)>,
    }

    impl Recorder {
        fn new() -> (Self, mpsc::UnboundedReceiver<(NodeId, message::Request)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Recorder { tx }, rx)
        }
    }

    impl Transport for Recorder {
        fn call(
            &self,
            peer: NodeId,
            request: message::Request,
        ) -> impl std::future::Future<Output = Result<message::Response, Error>> + Send {
            let tx = self.tx.clone();
            async move {
                tx.send((peer, request)).ok();
                Ok(message::Response::Ok { timestamp: 0 })
            }
        }
    }

    #[derive(Clone)]
    struct Recording {
        evidence: Arc<Mutex<Vec<Evidence>>>,
    }

    impl Recording {
        fn new() -> Self {
            Recording { evidence: Arc::new(Mutex::new(Vec::new())) }
        }
    }

    impl Workload for Recording {
        fn steps(&self) -> usize {
            2
        }

        fn operation(&self, node: NodeId, index: usize) -> i64 {
            (node * 10 + index) as i64
        }

        fn pace(&self) -> Duration {
            Duration::from_millis(0)
        }

        fn record(&self, evidence: &Evidence) -> Result<(), Error> {
            self.evidence.lock().push(evidence.clone());
            Ok(())
        }
    }

    fn node(id: NodeId, count: usize) -> (Arc<Node<Recorder>>, mpsc::UnboundedReceiver<(NodeId, message::Request)>) {
        let (transport, rx) = Recorder::new();
        (Arc::new(Node::new(id, count, transport)), rx)
    }

    #[tokio::test]
    async fn request_broadcasts_to_every_peer() {
        let (node, mut rx) = node(1, 3);
        let timestamp = node.request_cs().await;

        let mut peers = Vec::new();
        for _ in 0..2 {
            let (peer, request) = rx.recv().await.unwrap();
            assert_eq!(request, message::Request::Request { node: 1, timestamp });
            peers.push(peer);
        }
        peers.sort();
        assert_eq!(peers, vec![2, 3]);
        assert!(node.queue.contains(1));
        assert_eq!(*node.outstanding.lock(), Some(timestamp));
    }

    #[tokio::test]
    async fn requests_are_acknowledged_with_a_fresh_timestamp() {
        let (node, mut rx) = node(1, 3);
        let reply = node.on_request(2, 5);
        assert_eq!(reply, 7);
        assert_eq!(node.queue.min(), Some(crate::queue::Entry { timestamp: 5, node: 2 }));

        let (peer, request) = rx.recv().await.unwrap();
        assert_eq!(peer, 2);
        assert_eq!(
            request,
            message::Request::Reply { node: 1, timestamp: 7, request: 5 },
        );
    }

    #[tokio::test]
    async fn stale_replies_are_ignored() {
        let (node, _rx) = node(1, 3);

        // No outstanding request at all.
        node.on_reply(2, 4, 99);
        assert_eq!(node.replies.count(), 0);

        let timestamp = node.request_cs().await;
        node.on_reply(2, 9, timestamp);
        assert_eq!(node.replies.count(), 1);

        // Acknowledgement for a superseded episode.
        node.on_reply(3, 9, timestamp - 1);
        assert_eq!(node.replies.count(), 1);
        assert!(!node.replies.has_quorum(2));
    }

    #[tokio::test]
    async fn release_clears_the_claim() {
        let (node, _rx) = node(1, 3);
        node.on_request(2, 5);
        node.on_release(2, 8);
        assert!(!node.queue.contains(2));
        assert_eq!(node.queue.min(), None);
    }

    #[tokio::test]
    async fn entry_needs_quorum_and_queue_head() {
        let (node, _rx) = node(2, 3);

        // A competing claim with a smaller timestamp holds the head.
        node.on_request(1, 10);
        let timestamp = node.request_cs().await;
        node.on_reply(1, timestamp + 1, timestamp);
        node.on_reply(3, timestamp + 2, timestamp);
        assert!(node.replies.has_quorum(2));
        assert!(timeout(Duration::from_millis(50), node.await_entry()).await.is_err());

        // The head releases and admission follows.
        node.on_release(1, timestamp + 3);
        assert!(timeout(Duration::from_secs(1), node.await_entry()).await.is_ok());
    }

    #[tokio::test]
    async fn full_cycle_releases_and_records_evidence() {
        let (node, mut rx) = node(2, 3);
        let workload = Recording::new();

        let driver = {
            let node = Arc::clone(&node);
            let workload = workload.clone();
            tokio::spawn(async move { node.run_cycle(&workload).await })
        };

        let mut timestamp = 0;
        for _ in 0..2 {
            let (_, request) = rx.recv().await.unwrap();
            match request {
                message::Request::Request { node: 2, timestamp: ts } => timestamp = ts,
                request => panic!("expected a broadcast REQUEST, got {:?}", request),
            }
        }
        node.on_reply(1, timestamp + 1, timestamp);
        node.on_reply(3, timestamp + 2, timestamp);

        timeout(Duration::from_secs(5), driver)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let mut released = Vec::new();
        for _ in 0..2 {
            let (peer, request) = rx.recv().await.unwrap();
            assert!(matches!(request, message::Request::Release { node: 2, .. }));
            released.push(peer);
        }
        released.sort();
        assert_eq!(released, vec![1, 3]);
        assert!(!node.queue.contains(2));
        assert_eq!(*node.outstanding.lock(), None);

        let evidence = workload.evidence.lock();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].node, 2);
        assert_eq!(evidence[0].request, timestamp);
        assert_eq!(evidence[0].steps.len(), 2);
        assert_eq!(evidence[0].result, 20 + 21);

        let statistics = node.statistics();
        assert_eq!(statistics.cs_entries, 1);
        assert_eq!(statistics.messages_sent, 4);
        assert_eq!(statistics.messages_received, 2);
        assert_eq!(statistics, node.statistics());
    }
}
