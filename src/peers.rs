//! # Summary
//!
//! The channel between participants. Every remote operation is a single
//! request/response exchange, and each call opens its own connection, so
//! failures stay independent per peer and per call. A failed call is the
//! caller's problem to log and skip; nothing here retries.

use std::future::Future;

use log::trace;
use tokio::net;

use crate::error::Error;
use crate::message;
use crate::message::NodeId;
use crate::socket;

/// Named-peer invocation. The node state machine is generic over this
/// seam, which also lets the protocol logic run against an in-process
/// double in tests.
pub trait Transport: Send + Sync + 'static {
    /// Invoke `request` on `peer` and wait for its response.
    fn call(
        &self,
        peer: NodeId,
        request: message::Request,
    ) -> impl Future<Output = Result<message::Response, Error>> + Send;
}

/// TCP transport over the shared port-numbering scheme: participant `i`
/// listens at `base_port + i`.
#[derive(Copy, Clone, Debug)]
pub struct Peers {
    base_port: u16,
}

impl Peers {
    pub fn new(base_port: u16) -> Self {
        Peers { base_port }
    }

    /// Listening address of `peer`.
    pub fn address(&self, peer: NodeId) -> String {
        format!("127.0.0.1:{}", self.base_port + peer as u16)
    }
}

impl Transport for Peers {
    fn call(
        &self,
        peer: NodeId,
        request: message::Request,
    ) -> impl Future<Output = Result<message::Response, Error>> + Send {
        let address = self.address(peer);
        async move {
            trace!("calling {} with {:?}", address, request);
            let stream = net::TcpStream::connect(&address).await?;
            let (mut rx, mut tx) = socket::split::<message::Response, message::Request>(stream);
            tx.send(request).await?;
            match rx.recv().await {
                Some(response) => response,
                None => Err(Error::Closed),
            }
        }
    }
}
