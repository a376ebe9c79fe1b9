mod clock;
mod config;
mod error;
mod message;
mod node;
mod peers;
mod queue;
mod replies;
mod socket;
mod stats;
mod workload;

pub use crate::clock::Clock;
pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::message::{NodeId, Request, Response, Statistics};
pub use crate::node::Node;
pub use crate::peers::{Peers, Transport};
pub use crate::queue::{Entry, Queue};
pub use crate::replies::Replies;
pub use crate::workload::{Evidence, Step, Workload};
