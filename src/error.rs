//! Error types for transport and persistence operations.

use crate::message;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection or stream failure while talking to a peer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The remote end hung up before responding.
    #[error("connection closed before response")]
    Closed,

    /// The remote answered with a response of the wrong shape.
    #[error("unexpected response: {0:?}")]
    Unexpected(message::Response),
}
