//! Broadcaster side of the custom signaling path.
//!
//! # Flow
//!
//! 1. `AcquiringMedia`: open camera and microphone
//! 2. `Connecting`: create the peer connection, attach local tracks,
//!    clear stale negotiation from the record, publish an offer
//! 3. `Live`: the first answer seen in the record is applied once
//! 4. `Ended`: `end()` stops tracks, closes the connection and marks the
//!    record ended
//!
//! Local candidates are appended to the record as they are gathered; the
//! viewer's candidates are applied once a remote description exists.

use crate::config::BackendKind;
use crate::errors::LiveError;
use crate::media::{MediaConstraints, MediaDevices, MediaKind, MediaStream, RemoteStream};
use crate::model::{RecordPatch, SdpType, StreamRecord};
use crate::negotiation::{apply_remote_candidates, apply_remote_description_once, CandidateLedger};
use crate::observability::metrics;
use crate::peer::{PeerConfig, PeerConnection, PeerConnectionFactory};
use crate::peer_session::PeerSession;
use crate::state::{SessionRole, SessionState};
use crate::store::{RecordSubscription, SignalingStore};
use chrono::Utc;
use common::types::StreamId;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Receives the local stream once the offer is published, for preview.
pub type PreviewCallback = Box<dyn FnOnce(&MediaStream) + Send>;

/// Collaborators of the custom signaling path.
#[derive(Clone)]
pub struct SignalingDeps {
    pub store: Arc<dyn SignalingStore>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub media: Arc<dyn MediaDevices>,
    pub peer_config: PeerConfig,
    /// `None` waits for an answer until the session ends.
    pub answer_timeout: Option<Duration>,
}

impl SignalingDeps {
    #[must_use]
    pub fn new(
        store: Arc<dyn SignalingStore>,
        peers: Arc<dyn PeerConnectionFactory>,
        media: Arc<dyn MediaDevices>,
    ) -> Self {
        Self {
            store,
            peers,
            media,
            peer_config: PeerConfig::default(),
            answer_timeout: None,
        }
    }
}

/// A broadcast on the custom path.
///
/// Created `Idle`; [`start`](Self::start) runs the flow. Dropping the
/// session tears it down without touching the record.
pub struct BroadcastSession {
    core: PeerSession,
    deps: SignalingDeps,
}

impl BroadcastSession {
    /// `cancel` is usually a child of the session context token.
    #[must_use]
    pub fn new(stream_id: StreamId, deps: SignalingDeps, cancel: CancellationToken) -> Self {
        Self {
            core: PeerSession::new(
                stream_id,
                SessionRole::Broadcaster,
                Arc::clone(&deps.store),
                cancel,
            ),
            deps,
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        &self.core.stream_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.state.current()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.core.state.subscribe()
    }

    pub async fn local_stream(&self) -> Option<MediaStream> {
        self.core.local().await
    }

    #[must_use]
    pub fn remote_stream(&self) -> RemoteStream {
        self.core.remote.clone()
    }

    /// Run the flow up to publishing the offer. The session goes `Live`
    /// in the background when the answer arrives.
    ///
    /// # Errors
    ///
    /// - `LiveError::MediaPermissionDenied` if capture is refused
    /// - `LiveError::Peer` / `LiveError::Store` if negotiation cannot start
    ///
    /// Every error leaves the session in `Error`. Nothing is retried.
    #[instrument(skip_all, fields(stream_id = %self.core.stream_id))]
    pub async fn start(&self, preview: PreviewCallback) -> Result<(), LiveError> {
        self.core.state.transition(SessionState::AcquiringMedia)?;
        metrics::record_session_started(SessionRole::Broadcaster, BackendKind::Custom);

        let local = match self
            .deps
            .media
            .get_user_media(MediaConstraints::camera_and_microphone())
            .await
        {
            Ok(local) => local,
            Err(e) => return Err(self.core.fail(e.into()).await),
        };
        debug!(
            target: "live.broadcaster",
            tracks = local.tracks().len(),
            "Local media acquired"
        );
        self.core.set_local(local.clone()).await;

        if self.core.cancel.is_cancelled() {
            self.core.teardown().await;
            self.core.state.finish();
            return Ok(());
        }

        if let Err(e) = self.negotiate(&local).await {
            return Err(self.core.fail(e).await);
        }

        if self.core.cancel.is_cancelled() {
            return Ok(());
        }

        preview(&local);
        info!(target: "live.broadcaster", "Offer published, waiting for a viewer");
        Ok(())
    }

    async fn negotiate(&self, local: &MediaStream) -> Result<(), LiveError> {
        self.core.state.transition(SessionState::Connecting)?;

        // Stale offer/answer/candidates from an earlier broadcast would be
        // picked up as this session's answer
        self.deps.store.reset_negotiation(&self.core.stream_id).await?;

        let peer = self
            .core
            .open_peer(self.deps.peers.as_ref(), &self.deps.peer_config)
            .await?;

        for track in local.tracks() {
            peer.add_track(track).await?;
        }

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;

        if self.core.cancel.is_cancelled() {
            return Ok(());
        }

        self.deps
            .store
            .update(&self.core.stream_id, RecordPatch::offer(offer))
            .await?;

        let subscription = self.deps.store.subscribe(&self.core.stream_id).await?;
        tokio::spawn(run_answer_pump(
            self.core.clone(),
            peer,
            subscription,
            self.deps.answer_timeout,
        ));
        Ok(())
    }

    /// Mute or unmute the microphone. No renegotiation.
    pub async fn toggle_audio(&self, enabled: bool) {
        self.core.toggle(MediaKind::Audio, enabled).await;
    }

    /// Turn the camera on or off. No renegotiation.
    pub async fn toggle_video(&self, enabled: bool) {
        self.core.toggle(MediaKind::Video, enabled).await;
    }

    /// End the broadcast.
    ///
    /// Local teardown always completes. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// `LiveError::Store` if the record could not be marked ended. The
    /// failure is logged and not retried.
    #[instrument(skip_all, fields(stream_id = %self.core.stream_id))]
    pub async fn end(&self) -> Result<(), LiveError> {
        let before = self.core.state.current();
        if !self.core.state.finish() {
            // Already ended or failed; make sure resources are released
            self.core.cancel.cancel();
            self.core.teardown().await;
            return Ok(());
        }

        self.core.cancel.cancel();
        self.core.teardown().await;
        info!(target: "live.broadcaster", from = %before, "Broadcast ended");

        if before == SessionState::Idle {
            return Ok(());
        }

        if let Err(e) = self
            .deps
            .store
            .update(&self.core.stream_id, RecordPatch::ended(Utc::now()))
            .await
        {
            warn!(
                target: "live.broadcaster",
                error = %e,
                "Failed to mark stream ended"
            );
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for BroadcastSession {
    fn drop(&mut self) {
        self.core.cancel.cancel();
    }
}

/// Watch the record for the viewer's answer and candidates.
async fn run_answer_pump(
    core: PeerSession,
    peer: Arc<dyn PeerConnection>,
    mut subscription: RecordSubscription,
    answer_timeout: Option<Duration>,
) {
    let mut ledger = CandidateLedger::new();
    let mut answered = false;

    let deadline = answer_timeout.map(|t| (Instant::now() + t, t));
    let timeout = async move {
        match deadline {
            Some((at, window)) => {
                sleep_until(at).await;
                window
            }
            None => pending().await,
        }
    };
    tokio::pin!(timeout);

    loop {
        let snapshot = tokio::select! {
            biased;
            () = core.cancel.cancelled() => break,
            window = &mut timeout, if !answered => {
                core.fail(LiveError::AnswerTimeout(window)).await;
                break;
            }
            next = subscription.next() => next,
        };

        let record = match snapshot {
            Ok(record) => record,
            Err(e) => {
                if !core.cancel.is_cancelled() {
                    core.fail(e.into()).await;
                }
                break;
            }
        };

        match handle_snapshot(&core, peer.as_ref(), &record, &mut ledger).await {
            Ok(applied_answer) => answered |= applied_answer,
            Err(e) => {
                core.fail(e).await;
                break;
            }
        }
    }

    subscription.unsubscribe();
    debug!(target: "live.broadcaster", stream_id = %core.stream_id, "Answer pump stopped");
}

async fn handle_snapshot(
    core: &PeerSession,
    peer: &dyn PeerConnection,
    record: &StreamRecord,
    ledger: &mut CandidateLedger,
) -> Result<bool, LiveError> {
    let mut applied_answer = false;

    if let Some(answer) = record.answer.as_ref().filter(|a| a.sdp_type == SdpType::Answer) {
        if apply_remote_description_once(peer, answer).await? {
            applied_answer = true;
            core.state.transition(SessionState::Live)?;
            info!(target: "live.broadcaster", stream_id = %core.stream_id, "Answer applied, broadcast is live");
        }
    }

    apply_remote_candidates(peer, record, core.origin(), ledger).await?;
    Ok(applied_answer)
}
