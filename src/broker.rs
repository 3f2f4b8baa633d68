//! Secondary stream broker.
//!
//! Converters sometimes need a side channel next to the main call, for
//! example to stream a build log. The [`Broker`] hands out numbered streams:
//! one side opens stream `id`, the other side accepts it.
//!
//! [`MemoryBroker`] pairs both ends inside one process with
//! [`tokio::io::duplex`].

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::io::DuplexStream;

/// One end of a brokered stream.
pub type BrokerStream = DuplexStream;

/// Default in-memory buffer per stream direction.
pub const DEFAULT_STREAM_CAPACITY: usize = 64 * 1024;

/// Errors raised by a [`Broker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("stream {0} is already open")]
    InUse(u32),

    #[error("stream {0} was never opened")]
    Unknown(u32),

    #[error("broker closed")]
    Closed,
}

/// Allocates and connects secondary streams.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Reserve a fresh stream id.
    fn next_id(&self) -> u32;

    /// Open stream `id` and return the local end.
    async fn open_stream(&self, id: u32) -> Result<BrokerStream, BrokerError>;

    /// Accept the far end of stream `id`.
    async fn accept(&self, id: u32) -> Result<BrokerStream, BrokerError>;

    /// Drop stream `id` if it was opened but never accepted.
    ///
    /// Returns whether anything was dropped.
    fn close_stream(&self, id: u32) -> bool;
}

/// In-process broker backed by duplex pipes.
#[derive(Debug)]
pub struct MemoryBroker {
    next: AtomicU32,
    pending: DashMap<u32, BrokerStream>,
    capacity: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STREAM_CAPACITY)
    }

    /// Broker whose streams buffer `capacity` bytes per direction.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next: AtomicU32::new(1),
            pending: DashMap::new(),
            capacity,
        }
    }

    /// Streams opened but not yet accepted.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    async fn open_stream(&self, id: u32) -> Result<BrokerStream, BrokerError> {
        let (local, remote) = tokio::io::duplex(self.capacity);
        match self.pending.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BrokerError::InUse(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(remote);
                log::debug!("broker opened stream {}", id);
                Ok(local)
            }
        }
    }

    async fn accept(&self, id: u32) -> Result<BrokerStream, BrokerError> {
        self.pending
            .remove(&id)
            .map(|(_, stream)| stream)
            .ok_or(BrokerError::Unknown(id))
    }

    fn close_stream(&self, id: u32) -> bool {
        let removed = self.pending.remove(&id).is_some();
        if removed {
            log::debug!("broker dropped unaccepted stream {}", id);
        }
        removed
    }
}
