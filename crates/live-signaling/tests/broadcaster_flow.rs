//! Broadcaster flow against the in-memory store and mock media engine.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use live_signaling::broadcaster::{BroadcastSession, SignalingDeps};
use live_signaling::media::{MediaKind, TrackState};
use live_signaling::model::{
    CandidateOrigin, RecordPatch, SdpType, SessionDescription, StreamStatus,
};
use live_signaling::store::SignalingStore;
use live_signaling::{LiveError, SessionRole, SessionState};
use live_test_utils::*;
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<live_signaling::store::InMemorySignalingStore>,
    peers: Arc<MockPeerFactory>,
    media: Arc<MockMediaDevices>,
    session: BroadcastSession,
}

async fn harness_with(
    peers: MockPeerFactory,
    media: MockMediaDevices,
    answer_timeout: Option<Duration>,
) -> Harness {
    let id = stream_id();
    let store = seeded_store(&id).await;
    let peers = Arc::new(peers);
    let media = Arc::new(media);
    let mut deps = SignalingDeps::new(store.clone(), peers.clone(), media.clone());
    deps.answer_timeout = answer_timeout;
    let session = BroadcastSession::new(id, deps, CancellationToken::new());
    Harness {
        store,
        peers,
        media,
        session,
    }
}

async fn harness() -> Harness {
    harness_with(MockPeerFactory::new(), MockMediaDevices::granting(), None).await
}

fn no_preview() -> live_signaling::broadcaster::PreviewCallback {
    Box::new(|_| {})
}

async fn answer(h: &Harness, sdp: &str) {
    h.store
        .update(
            h.session.stream_id(),
            RecordPatch::answer(SessionDescription::answer(sdp)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_denied_media_fails_without_going_live() {
    let h = harness_with(MockPeerFactory::new(), MockMediaDevices::denying(), None).await;

    let err = h.session.start(no_preview()).await.unwrap_err();

    assert!(matches!(err, LiveError::MediaPermissionDenied));
    assert_eq!(
        err.client_message(SessionRole::Broadcaster),
        "Failed to start stream"
    );
    assert_eq!(h.session.state(), SessionState::Error);
    assert!(h.peers.connections().is_empty());

    let record = h.store.get(h.session.stream_id()).await.unwrap().unwrap();
    assert!(record.offer.is_none());
}

#[tokio::test]
async fn test_start_publishes_offer_and_local_candidates() {
    let h = harness_with(
        MockPeerFactory::new().with_candidates(vec![host_candidate(1), host_candidate(2)]),
        MockMediaDevices::granting(),
        None,
    )
    .await;
    let previewed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&previewed);

    h.session
        .start(Box::new(move |local| {
            seen.store(local.tracks().len(), Ordering::SeqCst);
        }))
        .await
        .unwrap();

    assert_eq!(h.session.state(), SessionState::Connecting);
    assert_eq!(previewed.load(Ordering::SeqCst), 2);

    let peer = h.peers.last().unwrap();
    assert_eq!(peer.count(|c| matches!(c, PeerCall::AddTrack(_))), 2);
    assert_eq!(peer.count(|c| *c == PeerCall::CreateOffer), 1);

    let record = eventually_record(h.store.as_ref(), h.session.stream_id(), "two candidates", |r| {
        r.candidates_from(CandidateOrigin::Broadcaster).count() == 2
    })
    .await;
    assert_eq!(record.offer.as_ref().unwrap().sdp_type, SdpType::Offer);
    assert_eq!(record.candidates_from(CandidateOrigin::Viewer).count(), 0);
}

#[tokio::test]
async fn test_start_clears_stale_negotiation() {
    let h = harness().await;
    let id = h.session.stream_id().clone();
    answer(&h, "stale answer").await;
    h.store
        .append_candidate(&id, candidate_from(CandidateOrigin::Viewer, 9))
        .await
        .unwrap();

    h.session.start(no_preview()).await.unwrap();

    let record = h.store.get(&id).await.unwrap().unwrap();
    assert!(record.answer.is_none());
    assert!(record.candidates.is_empty());
    assert!(record.offer.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.session.state(), SessionState::Connecting);
}

#[tokio::test]
async fn test_answer_is_applied_once() {
    let h = harness().await;
    let mut state = h.session.subscribe_state();
    h.session.start(no_preview()).await.unwrap();

    answer(&h, "first answer").await;
    wait_for_state(&mut state, SessionState::Live).await;

    answer(&h, "second answer").await;
    h.store
        .append_candidate(
            h.session.stream_id(),
            candidate_from(CandidateOrigin::Viewer, 1),
        )
        .await
        .unwrap();

    let peer = h.peers.last().unwrap();
    eventually("viewer candidate applied", || {
        peer.applied_candidates().len() == 1
    })
    .await;

    assert_eq!(
        peer.count(|c| matches!(c, PeerCall::SetRemoteDescription(_))),
        1
    );
    assert_eq!(peer.remote().unwrap().sdp, "first answer");
    assert_eq!(h.session.state(), SessionState::Live);
}

#[tokio::test]
async fn test_early_viewer_candidates_are_applied_from_the_record_after_answer() {
    let h = harness().await;
    let mut state = h.session.subscribe_state();
    let id = h.session.stream_id().clone();
    h.session.start(no_preview()).await.unwrap();

    h.store
        .append_candidate(&id, candidate_from(CandidateOrigin::Viewer, 1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peer = h.peers.last().unwrap();
    assert!(peer.applied_candidates().is_empty());

    answer(&h, "answer").await;
    wait_for_state(&mut state, SessionState::Live).await;
    eventually("early candidate applied", || {
        peer.applied_candidates().len() == 1
    })
    .await;
}

#[tokio::test]
async fn test_own_candidates_are_never_applied() {
    let h = harness_with(
        MockPeerFactory::new().with_candidates(vec![host_candidate(1)]),
        MockMediaDevices::granting(),
        None,
    )
    .await;
    let mut state = h.session.subscribe_state();
    h.session.start(no_preview()).await.unwrap();

    answer(&h, "answer").await;
    wait_for_state(&mut state, SessionState::Live).await;
    eventually_record(h.store.as_ref(), h.session.stream_id(), "own candidate", |r| {
        !r.candidates.is_empty()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.peers.last().unwrap().applied_candidates().is_empty());
}

#[tokio::test]
async fn test_toggles_do_not_renegotiate() {
    let h = harness().await;
    let mut state = h.session.subscribe_state();
    h.session.start(no_preview()).await.unwrap();
    answer(&h, "answer").await;
    wait_for_state(&mut state, SessionState::Live).await;

    h.session.toggle_audio(false).await;
    h.session.toggle_video(false).await;
    h.session.toggle_video(true).await;

    let local = h.session.local_stream().await.unwrap();
    assert!(local.tracks_of(MediaKind::Audio).all(|t| !t.enabled()));
    assert!(local.tracks_of(MediaKind::Video).all(|t| t.enabled()));

    let peer = h.peers.last().unwrap();
    assert_eq!(peer.count(|c| *c == PeerCall::CreateOffer), 1);
    assert_eq!(
        peer.count(|c| matches!(c, PeerCall::SetLocalDescription(_))),
        1
    );
    assert_eq!(h.session.state(), SessionState::Live);
}

#[tokio::test]
async fn test_end_stops_tracks_and_marks_record_ended() {
    let h = harness().await;
    let mut state = h.session.subscribe_state();
    h.session.start(no_preview()).await.unwrap();
    answer(&h, "answer").await;
    wait_for_state(&mut state, SessionState::Live).await;

    h.session.end().await.unwrap();

    assert_eq!(h.session.state(), SessionState::Ended);
    assert!(h
        .media
        .issued()
        .iter()
        .all(|t| t.ready_state() == TrackState::Ended));
    assert!(h.peers.last().unwrap().is_closed());

    let record = h.store.get(h.session.stream_id()).await.unwrap().unwrap();
    assert_eq!(record.status, StreamStatus::Ended);
    assert!(!record.is_live);
    assert!(record.ended_at.is_some());

    // Second end is a no-op
    h.session.end().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Ended);
}

#[tokio::test]
async fn test_end_before_start_leaves_record_untouched() {
    let h = harness().await;

    h.session.end().await.unwrap();

    assert_eq!(h.session.state(), SessionState::Ended);
    let record = h.store.get(h.session.stream_id()).await.unwrap().unwrap();
    assert_eq!(record.status, StreamStatus::Scheduled);
    assert!(record.ended_at.is_none());
}

#[tokio::test]
async fn test_missing_answer_times_out() {
    let h = harness_with(
        MockPeerFactory::new(),
        MockMediaDevices::granting(),
        Some(Duration::from_millis(50)),
    )
    .await;
    let mut state = h.session.subscribe_state();
    h.session.start(no_preview()).await.unwrap();

    wait_for_state(&mut state, SessionState::Error).await;

    assert!(h.peers.last().unwrap().is_closed());
    assert!(h
        .media
        .issued()
        .iter()
        .all(|t| t.ready_state() == TrackState::Ended));
}

#[tokio::test]
async fn test_rejected_answer_fails_session() {
    let h = harness_with(
        MockPeerFactory::new().rejecting_remote_description(),
        MockMediaDevices::granting(),
        None,
    )
    .await;
    let mut state = h.session.subscribe_state();
    h.session.start(no_preview()).await.unwrap();

    answer(&h, "garbage").await;

    wait_for_state(&mut state, SessionState::Error).await;
    assert!(h.peers.last().unwrap().is_closed());
}

#[tokio::test]
async fn test_cancellation_tears_down() {
    let id = stream_id();
    let store = seeded_store(&id).await;
    let peers = Arc::new(MockPeerFactory::new());
    let media = Arc::new(MockMediaDevices::granting());
    let cancel = CancellationToken::new();
    let session = BroadcastSession::new(
        id,
        SignalingDeps::new(store, peers.clone(), media.clone()),
        cancel.child_token(),
    );
    let mut state = session.subscribe_state();
    session.start(no_preview()).await.unwrap();

    cancel.cancel();

    wait_for_state(&mut state, SessionState::Ended).await;
    eventually("peer closed", || peers.last().unwrap().is_closed()).await;
    assert!(media
        .issued()
        .iter()
        .all(|t| t.ready_state() == TrackState::Ended));
}
