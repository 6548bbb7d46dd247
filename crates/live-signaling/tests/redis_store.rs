//! Redis signaling store against a real server.
//!
//! Needs `REDIS_URL` (e.g. `redis://localhost:6379`); every test returns
//! early when it is unset.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::secret::SecretString;
use live_signaling::model::{CandidateOrigin, RecordPatch, SessionDescription, StreamRecord};
use live_signaling::store::{RedisSignalingStore, SignalingStore, StoreError};
use live_test_utils::*;
use tokio::time::timeout;

async fn redis_store() -> Option<RedisSignalingStore> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping Redis store test");
        return None;
    };
    Some(
        RedisSignalingStore::connect(&SecretString::from(url))
            .await
            .expect("Failed to connect to Redis - is REDIS_URL reachable?"),
    )
}

async fn seeded(store: &RedisSignalingStore) -> StreamRecord {
    let record = StreamRecord::new(stream_id(), "Redis");
    store.create(record.clone()).await.unwrap();
    record
}

#[tokio::test]
async fn test_create_then_get_without_candidates() {
    let Some(store) = redis_store().await else {
        return;
    };
    let record = seeded(&store).await;

    let stored = store.get(&record.id).await.unwrap().unwrap();

    assert_eq!(stored, record);
    assert!(stored.candidates.is_empty());
}

#[tokio::test]
async fn test_get_missing_record_is_none() {
    let Some(store) = redis_store().await else {
        return;
    };

    assert!(store.get(&stream_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_append_deduplicates_identical_candidates() {
    let Some(store) = redis_store().await else {
        return;
    };
    let record = seeded(&store).await;
    let broadcaster = candidate_from(CandidateOrigin::Broadcaster, 1);
    let viewer = candidate_from(CandidateOrigin::Viewer, 1);

    assert!(store
        .append_candidate(&record.id, broadcaster.clone())
        .await
        .unwrap());
    assert!(!store
        .append_candidate(&record.id, broadcaster.clone())
        .await
        .unwrap());
    // Same candidate line from the other peer is a different entry
    assert!(store
        .append_candidate(&record.id, viewer.clone())
        .await
        .unwrap());

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.candidates, vec![broadcaster, viewer]);
}

#[tokio::test]
async fn test_concurrent_appends_keep_every_candidate() {
    let Some(store) = redis_store().await else {
        return;
    };
    let record = seeded(&store).await;

    let appends = (1..=10).map(|n| {
        let store = store.clone();
        let id = record.id.clone();
        let origin = if n % 2 == 0 {
            CandidateOrigin::Viewer
        } else {
            CandidateOrigin::Broadcaster
        };
        tokio::spawn(async move { store.append_candidate(&id, candidate_from(origin, n)).await })
    });
    for append in futures::future::join_all(appends).await {
        assert!(append.unwrap().unwrap());
    }

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.candidates.len(), 10);
}

#[tokio::test]
async fn test_reset_clears_negotiation_and_keeps_metadata() {
    let Some(store) = redis_store().await else {
        return;
    };
    let record = seeded(&store).await;
    store
        .update(&record.id, RecordPatch::offer(SessionDescription::offer("offer")))
        .await
        .unwrap();
    store
        .update(&record.id, RecordPatch::answer(SessionDescription::answer("answer")))
        .await
        .unwrap();
    store
        .append_candidate(&record.id, host_candidate(1))
        .await
        .unwrap();

    store.reset_negotiation(&record.id).await.unwrap();

    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert!(stored.offer.is_none());
    assert!(stored.answer.is_none());
    assert!(stored.candidates.is_empty());
    assert_eq!(stored.title, "Redis");

    // A later patch re-encodes the record without a candidate list
    store
        .update(&record.id, RecordPatch::offer(SessionDescription::offer("again")))
        .await
        .unwrap();
    let stored = store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.offer.unwrap().sdp, "again");
    assert!(stored.candidates.is_empty());
}

#[tokio::test]
async fn test_mutations_on_missing_record_are_not_found() {
    let Some(store) = redis_store().await else {
        return;
    };
    let id = stream_id();

    let update = store
        .update(&id, RecordPatch::offer(SessionDescription::offer("offer")))
        .await;
    let append = store.append_candidate(&id, host_candidate(1)).await;
    let reset = store.reset_negotiation(&id).await;

    assert_eq!(update, Err(StoreError::NotFound(id.clone())));
    assert_eq!(append, Err(StoreError::NotFound(id.clone())));
    assert_eq!(reset, Err(StoreError::NotFound(id.clone())));
    assert!(store.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_subscription_seeds_then_sees_append() {
    let Some(store) = redis_store().await else {
        return;
    };
    let record = seeded(&store).await;
    let mut subscription = store.subscribe(&record.id).await.unwrap();

    let first = timeout(WAIT, subscription.next()).await.unwrap().unwrap();
    assert_eq!(first, record);

    let candidate = candidate_from(CandidateOrigin::Viewer, 7);
    store
        .append_candidate(&record.id, candidate.clone())
        .await
        .unwrap();

    let next = timeout(WAIT, subscription.next()).await.unwrap().unwrap();
    assert_eq!(next.candidates, vec![candidate]);

    subscription.unsubscribe();
    assert_eq!(subscription.next().await, Err(StoreError::SubscriptionClosed));
}

#[tokio::test]
async fn test_subscription_before_create_sees_record() {
    let Some(store) = redis_store().await else {
        return;
    };
    let id = stream_id();
    let mut subscription = store.subscribe(&id).await.unwrap();

    store
        .create(StreamRecord::new(id.clone(), "Late"))
        .await
        .unwrap();

    let first = timeout(WAIT, subscription.next()).await.unwrap().unwrap();
    assert_eq!(first.id, id);
    assert_eq!(first.title, "Late");
}
