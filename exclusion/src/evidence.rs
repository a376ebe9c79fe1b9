//! # Summary
//!
//! This module abstracts over the durable evidence trail. Every
//! critical-section entry leaves one record behind for external audit;
//! nothing in-process reads it back.
//!
//! Uses `bincode` to serialize the record to the filesystem, truncating
//! and rewriting the file on every save. Naive but sufficient at one
//! record per node.

use std::io::Seek;

use parking_lot::Mutex;

use lamport::{Error, NodeId};

/// Durable store for one node's evidence records.
pub struct Store<S> {
    file: Mutex<std::fs::File>,
    _marker: std::marker::PhantomData<S>,
}

impl<S> Store<S> {
    /// Evidence file for `node` inside `dir`.
    pub fn for_node<P: AsRef<std::path::Path>>(dir: P, node: NodeId) -> Result<Self, Error> {
        Store::new(dir.as_ref().join(format!("evidence-{:>02}.lamport", node)))
    }

    /// Creates or opens the store at `path`.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Store {
            file: Mutex::new(file),
            _marker: Default::default(),
        })
    }
}

impl<S: serde::Serialize> Store<S> {
    /// Saves a record, replacing any previous one.
    pub fn save(&self, record: &S) -> Result<(), Error> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(std::io::SeekFrom::Start(0))?;
        bincode::serialize_into(&mut *file, record)?;
        Ok(())
    }
}

impl<S: serde::de::DeserializeOwned> Store<S> {
    /// Attempts to load the latest record, returning None if nothing has
    /// been written or the bytes do not parse.
    pub fn load(&self) -> Option<S> {
        let mut file = self.file.lock();
        file.seek(std::io::SeekFrom::Start(0)).ok()?;
        bincode::deserialize_from(&mut *file).ok()
    }
}
