//! Viewer side of the custom signaling path.
//!
//! The viewer never captures media. It follows the stream record, answers
//! the first offer it sees, and renders whatever tracks arrive.

use crate::broadcaster::SignalingDeps;
use crate::config::BackendKind;
use crate::errors::LiveError;
use crate::media::{MediaKind, MediaStream, RemoteStream};
use crate::model::{RecordPatch, SdpType, StreamRecord};
use crate::negotiation::{apply_remote_candidates, CandidateLedger};
use crate::observability::metrics;
use crate::peer::PeerConnection;
use crate::peer_session::PeerSession;
use crate::state::{SessionRole, SessionState};
use crate::store::RecordSubscription;
use common::types::StreamId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Receives the client-safe message when the session fails.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A viewer on the custom path.
pub struct ViewerSession {
    core: PeerSession,
    deps: SignalingDeps,
    on_error: ErrorCallback,
}

impl ViewerSession {
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        deps: SignalingDeps,
        cancel: CancellationToken,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            core: PeerSession::new(
                stream_id,
                SessionRole::Viewer,
                Arc::clone(&deps.store),
                cancel,
            ),
            deps,
            on_error,
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

    /// Inbound media for rendering.
    #[must_use]
    pub fn remote_stream(&self) -> RemoteStream {
        self.core.remote.clone()
    }

    /// Viewers publish nothing; present for interface parity.
    pub async fn local_stream(&self) -> Option<MediaStream> {
        self.core.local().await
    }

    /// Connect and start following the record.
    ///
    /// # Errors
    ///
    /// `LiveError::Peer` or `LiveError::Store` if the connection or the
    /// subscription cannot be set up. Failures after this returns go to the
    /// error callback.
    #[instrument(skip_all, fields(stream_id = %self.core.stream_id))]
    pub async fn join(&self) -> Result<(), LiveError> {
        self.core.state.transition(SessionState::Connecting)?;
        metrics::record_session_started(SessionRole::Viewer, BackendKind::Custom);

        let setup = async {
            let peer = self
                .core
                .open_peer(self.deps.peers.as_ref(), &self.deps.peer_config)
                .await?;
            let subscription = self.deps.store.subscribe(&self.core.stream_id).await?;
            Ok::<_, LiveError>((peer, subscription))
        };

        match setup.await {
            Ok((peer, subscription)) => {
                tokio::spawn(run_offer_pump(
                    self.core.clone(),
                    peer,
                    subscription,
                    Arc::clone(&self.on_error),
                ));
                debug!(target: "live.viewer", "Waiting for offer");
                Ok(())
            }
            Err(e) => Err(self.core.fail(e).await),
        }
    }

    /// Toggles are accepted and ignored by a receive-only session.
    pub async fn toggle_audio(&self, enabled: bool) {
        self.core.toggle(MediaKind::Audio, enabled).await;
    }

    pub async fn toggle_video(&self, enabled: bool) {
        self.core.toggle(MediaKind::Video, enabled).await;
    }

    /// Stop watching. The broadcaster is not notified and the record is
    /// left as is.
    pub async fn leave(&self) {
        if self.core.state.finish() {
            info!(target: "live.viewer", stream_id = %self.core.stream_id, "Left stream");
        }
        self.core.cancel.cancel();
        self.core.teardown().await;
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.core.cancel.cancel();
    }
}

async fn run_offer_pump(
    core: PeerSession,
    peer: Arc<dyn PeerConnection>,
    mut subscription: RecordSubscription,
    on_error: ErrorCallback,
) {
    let mut ledger = CandidateLedger::new();

    loop {
        let snapshot = tokio::select! {
            biased;
            () = core.cancel.cancelled() => break,
            next = subscription.next() => next,
        };

        let result = match snapshot {
            Ok(record) => handle_snapshot(&core, peer.as_ref(), &record, &mut ledger).await,
            Err(_) if core.cancel.is_cancelled() => break,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            let message = e.client_message(SessionRole::Viewer);
            core.fail(e).await;
            on_error(message);
            break;
        }
    }

    subscription.unsubscribe();
    debug!(
        target: "live.viewer",
        stream_id = %core.stream_id,
        applied = ledger.applied(),
        dropped = ledger.dropped(),
        "Offer pump stopped"
    );
}

async fn handle_snapshot(
    core: &PeerSession,
    peer: &dyn PeerConnection,
    record: &StreamRecord,
    ledger: &mut CandidateLedger,
) -> Result<(), LiveError> {
    // Offer first: candidates in the same snapshot need a remote description
    if let Some(offer) = record.offer.as_ref().filter(|o| o.sdp_type == SdpType::Offer) {
        if peer.remote_description().await.is_none() {
            peer.set_remote_description(offer.clone()).await?;
            let answer = peer.create_answer().await?;
            peer.set_local_description(answer.clone()).await?;
            core.store
                .update(&core.stream_id, RecordPatch::answer(answer))
                .await?;
            core.state.transition(SessionState::Live)?;
            info!(target: "live.viewer", stream_id = %core.stream_id, "Answer published, watching live");
        }
    }

    apply_remote_candidates(peer, record, core.origin(), ledger).await?;
    Ok(())
}
