//! Test data and helpers shared by the flow tests.

use common::secret::SecretString;
use common::session::{SessionContext, UserSession};
use common::types::{ParticipantId, StreamId, UserId};
use live_signaling::managed::RemoteParticipant;
use live_signaling::media::{MediaKind, RemoteTrack};
use live_signaling::model::{CandidateOrigin, IceCandidate, StreamRecord};
use live_signaling::state::SessionState;
use live_signaling::store::{InMemorySignalingStore, SignalingStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Default wait for asynchronous state changes in flow tests.
pub const WAIT: Duration = Duration::from_secs(2);

/// Identity token the signed-in fixture user presents.
pub const TEST_ID_TOKEN: &str = "test-id-token";

/// A fresh random stream id.
#[must_use]
pub fn stream_id() -> StreamId {
    StreamId::from(format!("stream-{}", Uuid::new_v4().simple()))
}

#[must_use]
pub fn signed_in_context() -> Arc<SessionContext> {
    let ctx = SessionContext::new();
    ctx.sign_in(UserSession::new(
        UserId::from("user-1"),
        SecretString::from(TEST_ID_TOKEN),
    ));
    Arc::new(ctx)
}

#[must_use]
pub fn signed_out_context() -> Arc<SessionContext> {
    Arc::new(SessionContext::new())
}

/// In-memory store holding a record for `id`.
pub async fn seeded_store(id: &StreamId) -> Arc<InMemorySignalingStore> {
    let store = InMemorySignalingStore::new();
    store
        .create(StreamRecord::new(id.clone(), "Test stream"))
        .await
        .expect("seeding the in-memory store cannot fail");
    Arc::new(store)
}

/// Host candidate number `n`, as gathered (origin is set by the session).
#[must_use]
pub fn host_candidate(n: u16) -> IceCandidate {
    IceCandidate::new(format!(
        "candidate:{n} 1 udp 2122260223 192.0.2.{n} {} typ host",
        50_000 + n
    ))
}

/// Candidate `n` as written to the record by `origin`.
#[must_use]
pub fn candidate_from(origin: CandidateOrigin, n: u16) -> IceCandidate {
    host_candidate(n).with_origin(origin)
}

#[must_use]
pub fn video_track(id: &str) -> RemoteTrack {
    RemoteTrack::new(id, MediaKind::Video)
}

#[must_use]
pub fn audio_track(id: &str) -> RemoteTrack {
    RemoteTrack::new(id, MediaKind::Audio)
}

/// A room participant publishing one video and one audio track.
#[must_use]
pub fn participant(id: &str) -> RemoteParticipant {
    let pid = ParticipantId::from(id);
    RemoteParticipant {
        id: pid.clone(),
        identity: format!("{id}-identity"),
        tracks: vec![
            video_track(&format!("{id}-video")).from_participant(pid.clone()),
            audio_track(&format!("{id}-audio")).from_participant(pid),
        ],
    }
}

/// Wait until `rx` reports `want`. Panics after [`WAIT`].
pub async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, want: SessionState) {
    let reached = tokio::time::timeout(WAIT, rx.wait_for(|s| *s == want))
        .await
        .map(|seen| seen.is_ok());
    match reached {
        Ok(true) => {}
        Ok(false) => panic!("state channel closed while waiting for {want}"),
        Err(_) => panic!("timed out waiting for {want}, last state {}", *rx.borrow()),
    }
}

/// Poll `check` until it holds. Panics after [`WAIT`].
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll the store until the record for `id` satisfies `check`.
pub async fn eventually_record(
    store: &dyn SignalingStore,
    id: &StreamId,
    what: &str,
    check: impl Fn(&StreamRecord) -> bool,
) -> StreamRecord {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Some(record) = store.get(id).await.expect("store read") {
            if check(&record) {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for record: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
