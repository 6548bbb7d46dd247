//! In-process signaling store.
//!
//! Each stream's record lives inside its own `watch` channel, so a write and
//! the snapshot subscribers see are the same operation.

use super::{RecordSubscription, SignalingStore, StoreError};
use crate::model::{IceCandidate, RecordPatch, StreamRecord};
use async_trait::async_trait;
use common::types::StreamId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

type Slot = watch::Sender<Option<StreamRecord>>;

/// `HashMap` of per-stream watch channels behind a mutex.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemorySignalingStore {
    streams: Arc<Mutex<HashMap<StreamId, Slot>>>,
}

impl InMemorySignalingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_streams<R>(&self, f: impl FnOnce(&mut HashMap<StreamId, Slot>) -> R) -> R {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut streams)
    }

    /// Mutate an existing record and publish the result.
    fn modify<R>(
        &self,
        stream_id: &StreamId,
        f: impl FnOnce(&mut StreamRecord) -> (bool, R),
    ) -> Result<R, StoreError> {
        self.with_streams(|streams| {
            let slot = streams
                .get(stream_id)
                .ok_or_else(|| StoreError::NotFound(stream_id.clone()))?;

            let mut outcome = None;
            slot.send_if_modified(|current| match current.as_mut() {
                Some(record) => {
                    let (changed, result) = f(record);
                    outcome = Some(result);
                    changed
                }
                None => false,
            });

            outcome.ok_or_else(|| StoreError::NotFound(stream_id.clone()))
        })
    }
}

#[async_trait]
impl SignalingStore for InMemorySignalingStore {
    #[instrument(skip_all, fields(stream_id = %record.id))]
    async fn create(&self, record: StreamRecord) -> Result<(), StoreError> {
        self.with_streams(|streams| {
            let id = record.id.clone();
            match streams.get(&id) {
                Some(slot) => {
                    slot.send_replace(Some(record));
                }
                None => {
                    let (slot, _) = watch::channel(Some(record));
                    streams.insert(id, slot);
                }
            }
        });
        debug!(target: "live.store.memory", "Record created");
        Ok(())
    }

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamRecord>, StoreError> {
        Ok(self.with_streams(|streams| {
            streams
                .get(stream_id)
                .and_then(|slot| slot.borrow().clone())
        }))
    }

    #[instrument(skip_all, fields(stream_id = %stream_id))]
    async fn update(&self, stream_id: &StreamId, patch: RecordPatch) -> Result<(), StoreError> {
        self.modify(stream_id, |record| {
            patch.apply_to(record);
            (true, ())
        })
    }

    #[instrument(skip_all, fields(stream_id = %stream_id, origin = candidate.origin.as_str()))]
    async fn append_candidate(
        &self,
        stream_id: &StreamId,
        candidate: IceCandidate,
    ) -> Result<bool, StoreError> {
        self.modify(stream_id, |record| {
            let added = record.push_candidate(candidate);
            (added, added)
        })
    }

    #[instrument(skip_all, fields(stream_id = %stream_id))]
    async fn reset_negotiation(&self, stream_id: &StreamId) -> Result<(), StoreError> {
        self.modify(stream_id, |record| {
            record.clear_negotiation();
            (true, ())
        })
    }

    async fn subscribe(&self, stream_id: &StreamId) -> Result<RecordSubscription, StoreError> {
        let rx = self.with_streams(|streams| {
            // Waiting slots whose subscribers all left never got a record
            streams.retain(|_, slot| slot.borrow().is_some() || slot.receiver_count() > 0);
            streams
                .entry(stream_id.clone())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe()
        });
        Ok(RecordSubscription::new(rx, CancellationToken::new()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{CandidateOrigin, SessionDescription};

    fn stream() -> StreamId {
        StreamId::from("stream-1")
    }

    async fn seeded() -> InMemorySignalingStore {
        let store = InMemorySignalingStore::new();
        store
            .create(StreamRecord::new(stream(), "Morning show"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = seeded().await;
        let record = store.get(&stream()).await.unwrap().unwrap();
        assert_eq!(record.title, "Morning show");
        assert!(store.get(&StreamId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = InMemorySignalingStore::new();
        let err = store
            .update(&stream(), RecordPatch::offer(SessionDescription::offer("o")))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(stream()));
    }

    #[tokio::test]
    async fn test_update_is_last_write_wins() {
        let store = seeded().await;
        store
            .update(&stream(), RecordPatch::answer(SessionDescription::answer("a1")))
            .await
            .unwrap();
        store
            .update(&stream(), RecordPatch::answer(SessionDescription::answer("a2")))
            .await
            .unwrap();

        let record = store.get(&stream()).await.unwrap().unwrap();
        assert_eq!(record.answer.unwrap().sdp, "a2");
    }

    #[tokio::test]
    async fn test_append_candidate_dedupes() {
        let store = seeded().await;
        let c = IceCandidate::new("candidate:1");
        assert!(store.append_candidate(&stream(), c.clone()).await.unwrap());
        assert!(!store.append_candidate(&stream(), c).await.unwrap());

        let record = store.get(&stream()).await.unwrap().unwrap();
        assert_eq!(record.candidates.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let store = seeded().await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            let origin = if i % 2 == 0 {
                CandidateOrigin::Broadcaster
            } else {
                CandidateOrigin::Viewer
            };
            handles.push(tokio::spawn(async move {
                store
                    .append_candidate(
                        &stream(),
                        IceCandidate::new(format!("candidate:{i}")).with_origin(origin),
                    )
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        let record = store.get(&stream()).await.unwrap().unwrap();
        assert_eq!(record.candidates.len(), 50);
    }

    #[tokio::test]
    async fn test_reset_negotiation_clears_signaling_only() {
        let store = seeded().await;
        store
            .update(&stream(), RecordPatch::offer(SessionDescription::offer("o")))
            .await
            .unwrap();
        store
            .append_candidate(&stream(), IceCandidate::new("candidate:1"))
            .await
            .unwrap();

        store.reset_negotiation(&stream()).await.unwrap();

        let record = store.get(&stream()).await.unwrap().unwrap();
        assert!(record.offer.is_none());
        assert!(record.candidates.is_empty());
        assert_eq!(record.title, "Morning show");
    }

    #[tokio::test]
    async fn test_subscribe_sees_current_then_updates() {
        let store = seeded().await;
        let mut sub = store.subscribe(&stream()).await.unwrap();

        let first = sub.next().await.unwrap();
        assert!(first.offer.is_none());

        store
            .update(&stream(), RecordPatch::offer(SessionDescription::offer("o")))
            .await
            .unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(second.offer.unwrap().sdp, "o");
    }

    #[tokio::test]
    async fn test_subscribe_before_create() {
        let store = InMemorySignalingStore::new();
        let mut sub = store.subscribe(&stream()).await.unwrap();

        store
            .create(StreamRecord::new(stream(), "Late start"))
            .await
            .unwrap();

        assert_eq!(sub.next().await.unwrap().title, "Late start");
    }

    #[tokio::test]
    async fn test_duplicate_append_does_not_notify() {
        let store = seeded().await;
        let c = IceCandidate::new("candidate:1");
        store.append_candidate(&stream(), c.clone()).await.unwrap();

        let mut sub = store.subscribe(&stream()).await.unwrap();
        sub.next().await.unwrap();

        store.append_candidate(&stream(), c).await.unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), sub.next()).await;
        assert!(pending.is_err(), "duplicate append must not publish a snapshot");
    }

    #[tokio::test]
    async fn test_abandoned_waiting_slots_are_pruned() {
        let store = seeded().await;
        for n in 0..5 {
            let sub = store
                .subscribe(&StreamId::from(format!("never-{n}")))
                .await
                .unwrap();
            drop(sub);
        }
        let _waiting = store.subscribe(&StreamId::from("waiting")).await.unwrap();

        let mut ids: Vec<String> = store
            .with_streams(|streams| streams.keys().map(ToString::to_string).collect());
        ids.sort();
        assert_eq!(ids, vec!["stream-1".to_string(), "waiting".to_string()]);
    }
}
