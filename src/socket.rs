//! # Summary
//!
//! This module abstracts over connections between nodes and from the
//! coordinator.
//!
//! Wraps `tokio-util`'s length-delimited codec around `tokio`'s
//! asynchronous TCP stream and runs `bincode` over each frame. This lets
//! us serialize and deserialize Rust structs through a TCP connection
//! with minimal boilerplate on the sending and receiving ends.

use std::marker::PhantomData;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::Error;

/// Receiving channel. Expects length-delimited, bincode-encoded data of
/// type `R` sent via TCP.
pub struct Rx<R> {
    inner: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    _marker: PhantomData<R>,
}

/// Transmitting channel. Sends length-delimited, bincode-encoded data of
/// type `T` over TCP.
pub struct Tx<T> {
    inner: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    _marker: PhantomData<T>,
}

/// Split a `tokio::net::TcpStream` into a pair of receiving and
/// transmitting channels capable of reading and writing bincode-encoded
/// data.
pub fn split<R, T>(stream: net::TcpStream) -> (Rx<R>, Tx<T>)
where
    R: serde::de::DeserializeOwned,
    T: serde::Serialize,
{
    let (rx, tx) = stream.into_split();
    let rx = Rx {
        inner: FramedRead::new(rx, LengthDelimitedCodec::new()),
        _marker: PhantomData,
    };
    let tx = Tx {
        inner: FramedWrite::new(tx, LengthDelimitedCodec::new()),
        _marker: PhantomData,
    };
    (rx, tx)
}

impl<R: serde::de::DeserializeOwned> Rx<R> {
    /// Next decoded message, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<Result<R, Error>> {
        match self.inner.next().await? {
            Ok(frame) => Some(bincode::deserialize(&frame[..]).map_err(Error::from)),
            Err(error) => Some(Err(Error::from(error))),
        }
    }
}

impl<T: serde::Serialize> Tx<T> {
    pub async fn send(&mut self, item: T) -> Result<(), Error> {
        let frame = bincode::serialize(&item)?;
        self.inner.send(Bytes::from(frame)).await?;
        Ok(())
    }
}
