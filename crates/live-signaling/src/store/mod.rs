//! Signaling store: one shared record per stream.
//!
//! The record is the only transport between broadcaster and viewer on the
//! custom path. Every mutation produces a full snapshot that subscribers
//! receive; intermediate snapshots may coalesce.
//!
//! # Backends
//!
//! - [`InMemorySignalingStore`] for a single process and tests
//! - [`RedisSignalingStore`] for peers in different processes
//!
//! # Semantics
//!
//! - Field writes are last-write-wins.
//! - `append_candidate` is an atomic union: concurrent appends from both
//!   peers never lose a candidate, and a duplicate is not added twice.

mod lua_scripts;
mod memory;
mod redis;

pub use self::memory::InMemorySignalingStore;
pub use self::redis::RedisSignalingStore;

use crate::model::{IceCandidate, RecordPatch, StreamRecord};
use async_trait::async_trait;
use common::types::StreamId;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists for the stream.
    #[error("Stream record not found: {0}")]
    NotFound(StreamId),

    /// A record could not be encoded or decoded.
    #[error("Record serialization failed: {0}")]
    Serialization(String),

    /// The backing service failed.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// The update feed ended while the subscriber was still listening.
    #[error("Record subscription closed")]
    SubscriptionClosed,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Shared stream record storage.
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Insert or overwrite a record.
    async fn create(&self, record: StreamRecord) -> Result<(), StoreError>;

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamRecord>, StoreError>;

    /// Write the fields present in `patch`.
    ///
    /// Fails with `StoreError::NotFound` if the record does not exist.
    async fn update(&self, stream_id: &StreamId, patch: RecordPatch) -> Result<(), StoreError>;

    /// Atomically add `candidate` to the record's candidate list.
    ///
    /// Returns `false` if an identical candidate was already present.
    async fn append_candidate(
        &self,
        stream_id: &StreamId,
        candidate: IceCandidate,
    ) -> Result<bool, StoreError>;

    /// Clear offer, answer and candidates, keeping stream metadata.
    async fn reset_negotiation(&self, stream_id: &StreamId) -> Result<(), StoreError>;

    /// Follow the record: the current snapshot (if any) first, then every
    /// later snapshot.
    async fn subscribe(&self, stream_id: &StreamId) -> Result<RecordSubscription, StoreError>;
}

/// Live view of one stream record.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// stops delivery and releases the backend listener.
#[derive(Debug)]
pub struct RecordSubscription {
    rx: watch::Receiver<Option<StreamRecord>>,
    cancel: CancellationToken,
    primed: bool,
}

impl RecordSubscription {
    /// Wrap a snapshot feed. `cancel` is cancelled when the subscription
    /// goes away so the producer can stop.
    #[must_use]
    pub fn new(rx: watch::Receiver<Option<StreamRecord>>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            primed: false,
        }
    }

    /// Next snapshot.
    ///
    /// # Errors
    ///
    /// `StoreError::SubscriptionClosed` once the feed has ended, or after
    /// [`unsubscribe`](Self::unsubscribe).
    pub async fn next(&mut self) -> Result<StreamRecord, StoreError> {
        if !self.primed {
            self.primed = true;
            if let Some(record) = self.rx.borrow_and_update().clone() {
                return Ok(record);
            }
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(StoreError::SubscriptionClosed),
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return Err(StoreError::SubscriptionClosed);
                    }
                    if let Some(record) = self.rx.borrow_and_update().clone() {
                        return Ok(record);
                    }
                }
            }
        }
    }

    /// Stop delivery. Further `next` calls fail immediately.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for RecordSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
