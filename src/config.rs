//! # Summary
//!
//! Wires one participant together: a listener serving inbound calls with
//! one concurrently running handler task per connection, a driver running
//! the node's own request cycle, and the shutdown sequence.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net;

use crate::error::Error;
use crate::message;
use crate::message::NodeId;
use crate::node::Node;
use crate::peers::{Peers, Transport};
use crate::socket;
use crate::workload::Workload;

/// Participant configuration. Every node derives its address from the
/// shared base port and its ordinal.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Unique node ID, 1-based.
    id: NodeId,

    /// Total number of participants.
    count: usize,

    /// Shared base port; node `i` listens at `base_port + i`.
    base_port: u16,

    /// Startup stagger before issuing this node's own request.
    delay: Duration,
}

impl Config {
    pub fn new(id: NodeId, count: usize, base_port: u16) -> Self {
        Config {
            id,
            count,
            base_port,
            delay: Duration::from_secs(2),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serve inbound calls and run one critical-section cycle. Returns
    /// once the cycle is complete and shutdown has been requested; the
    /// listening port closes on return, so later probes are refused.
    pub async fn run<W: Workload>(self, workload: W) -> Result<(), Error> {
        let node = Arc::new(Node::new(self.id, self.count, Peers::new(self.base_port)));
        let address = format!("127.0.0.1:{}", self.base_port + self.id as u16);
        let listener = net::TcpListener::bind(&address).await?;
        info!("[node-{}] listening on {}", self.id, address);

        let server = tokio::spawn(accept(listener, Arc::clone(&node)));

        let driver = {
            let node = Arc::clone(&node);
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                node.run_cycle(&workload).await
            })
        };

        match driver.await {
            Ok(Ok(())) => info!("[node-{}] cycle complete", self.id),
            Ok(Err(error)) => error!("[node-{}] cycle failed: {}", self.id, error),
            Err(error) => error!("[node-{}] driver panicked: {}", self.id, error),
        }

        node.await_shutdown().await;
        server.abort();
        let _ = server.await;
        info!("[node-{}] stopped", self.id);
        Ok(())
    }
}

/// Accept loop: one handler task per inbound connection.
async fn accept<T: Transport>(listener: net::TcpListener, node: Arc<Node<T>>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve(stream, Arc::clone(&node)));
            }
            Err(error) => warn!("[node-{}] accept failed: {}", node.id(), error),
        }
    }
}

/// Serve framed requests on one connection until the caller hangs up.
async fn serve<T: Transport>(stream: net::TcpStream, node: Arc<Node<T>>) {
    let (mut rx, mut tx) = socket::split::<message::Request, message::Response>(stream);
    while let Some(inbound) = rx.recv().await {
        let inbound = match inbound {
            Ok(inbound) => inbound,
            Err(error) => {
                warn!("[node-{}] bad frame: {}", node.id(), error);
                return;
            }
        };
        let response = match inbound {
            message::Request::Request { node: from, timestamp } => {
                let timestamp = node.on_request(from, timestamp);
                message::Response::Ok { timestamp }
            }
            message::Request::Reply { node: from, timestamp, request } => {
                let timestamp = node.on_reply(from, timestamp, request);
                message::Response::Ok { timestamp }
            }
            message::Request::Release { node: from, timestamp } => {
                let timestamp = node.on_release(from, timestamp);
                message::Response::Ok { timestamp }
            }
            message::Request::Ping => message::Response::Alive { node: node.id() },
            message::Request::Statistics => message::Response::Statistics(node.statistics()),
            message::Request::Shutdown => {
                node.begin_shutdown();
                message::Response::Shutdown
            }
        };
        if let Err(error) = tx.send(response).await {
            warn!("[node-{}] failed to respond: {}", node.id(), error);
            return;
        }
    }
}
