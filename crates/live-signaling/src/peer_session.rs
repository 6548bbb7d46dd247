//! Pieces shared by the broadcaster and viewer sessions.
//!
//! A [`PeerSession`] owns the peer connection, the local and remote media,
//! the state tracker and the cancellation token. It is cheap to clone: the
//! session handle and its two pumps each hold one.

use crate::errors::LiveError;
use crate::media::{MediaKind, MediaStream, RemoteStream};
use crate::model::CandidateOrigin;
use crate::observability::metrics;
use crate::peer::{PeerConfig, PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEvent};
use crate::state::{SessionRole, SessionStateTracker};
use crate::store::SignalingStore;
use common::types::StreamId;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct Parts {
    local: Option<MediaStream>,
    peer: Option<Arc<dyn PeerConnection>>,
}

#[derive(Clone)]
pub(crate) struct PeerSession {
    pub(crate) stream_id: StreamId,
    pub(crate) store: Arc<dyn SignalingStore>,
    pub(crate) state: SessionStateTracker,
    pub(crate) cancel: CancellationToken,
    pub(crate) remote: RemoteStream,
    parts: Arc<Mutex<Parts>>,
}

impl PeerSession {
    pub(crate) fn new(
        stream_id: StreamId,
        role: SessionRole,
        store: Arc<dyn SignalingStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream_id,
            store,
            state: SessionStateTracker::new(role),
            cancel,
            remote: RemoteStream::new(),
            parts: Arc::new(Mutex::new(Parts::default())),
        }
    }

    pub(crate) fn role(&self) -> SessionRole {
        self.state.role()
    }

    /// Which origin tag this side writes on its candidates.
    pub(crate) fn origin(&self) -> CandidateOrigin {
        match self.role() {
            SessionRole::Broadcaster => CandidateOrigin::Broadcaster,
            SessionRole::Viewer => CandidateOrigin::Viewer,
        }
    }

    pub(crate) async fn set_local(&self, local: MediaStream) {
        self.parts.lock().await.local = Some(local);
    }

    pub(crate) async fn local(&self) -> Option<MediaStream> {
        self.parts.lock().await.local.clone()
    }

    pub(crate) async fn peer(&self) -> Option<Arc<dyn PeerConnection>> {
        self.parts.lock().await.peer.clone()
    }

    /// Enable or disable local tracks of `kind`. No renegotiation.
    pub(crate) async fn toggle(&self, kind: MediaKind, enabled: bool) {
        if let Some(local) = self.parts.lock().await.local.as_ref() {
            let changed = local.set_enabled(kind, enabled);
            debug!(
                target: "live.media",
                stream_id = %self.stream_id,
                kind = %kind,
                enabled,
                changed,
                "Toggled local tracks"
            );
        }
    }

    /// Create the peer connection and start forwarding its events.
    pub(crate) async fn open_peer(
        &self,
        factory: &dyn PeerConnectionFactory,
        config: &PeerConfig,
    ) -> Result<Arc<dyn PeerConnection>, LiveError> {
        let (peer, events) = factory.create(config).await?;
        self.parts.lock().await.peer = Some(Arc::clone(&peer));
        tokio::spawn(self.clone().run_peer_events(events));
        Ok(peer)
    }

    /// Forward engine callbacks until cancelled, then tear down.
    async fn run_peer_events(self, mut events: mpsc::Receiver<PeerEvent>) {
        let origin = self.origin();
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!(
                            target: "live.session",
                            role = %self.role(),
                            stream_id = %self.stream_id,
                            "Peer event channel closed"
                        );
                        // Keep waiting for cancellation so teardown still runs here
                        self.cancel.cancelled().await;
                        break;
                    };
                    self.handle_peer_event(event, origin).await;
                }
            }
        }

        self.teardown().await;
        self.state.finish();
    }

    async fn handle_peer_event(&self, event: PeerEvent, origin: CandidateOrigin) {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                let candidate = candidate.with_origin(origin);
                match self.store.append_candidate(&self.stream_id, candidate).await {
                    Ok(true) => metrics::record_candidate_appended(origin),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            target: "live.negotiation",
                            stream_id = %self.stream_id,
                            origin = origin.as_str(),
                            error = %e,
                            "Failed to append local candidate"
                        );
                    }
                }
            }
            PeerEvent::IceGatheringComplete => {
                debug!(target: "live.negotiation", stream_id = %self.stream_id, "ICE gathering complete");
            }
            PeerEvent::Track(track) => {
                let kind = track.kind;
                if self.remote.add(track) {
                    info!(
                        target: "live.session",
                        role = %self.role(),
                        stream_id = %self.stream_id,
                        kind = %kind,
                        "Remote track added"
                    );
                }
            }
            PeerEvent::ConnectionStateChanged(state) => match state {
                PeerConnectionState::Failed | PeerConnectionState::Disconnected => {
                    warn!(
                        target: "live.session",
                        role = %self.role(),
                        stream_id = %self.stream_id,
                        ?state,
                        "Peer connection degraded"
                    );
                }
                _ => {
                    debug!(target: "live.session", stream_id = %self.stream_id, ?state, "Peer connection state");
                }
            },
        }
    }

    /// Stop local tracks, close the peer connection and drop remote media.
    /// Idempotent.
    pub(crate) async fn teardown(&self) {
        let (local, peer) = {
            let mut parts = self.parts.lock().await;
            (parts.local.clone(), parts.peer.take())
        };
        if let Some(local) = local {
            local.stop_all();
        }
        if let Some(peer) = peer {
            peer.close().await;
        }
        self.remote.clear();
    }

    /// Record a terminal failure: log, count, move to `Error` (or `Ended`
    /// past the point where `Error` is reachable) and tear down.
    pub(crate) async fn fail(&self, err: LiveError) -> LiveError {
        error!(
            target: "live.session",
            role = %self.role(),
            stream_id = %self.stream_id,
            error = %err,
            "Live session failed"
        );
        metrics::record_session_failure(self.role(), err.reason());
        if !self.state.fail() {
            self.state.finish();
        }
        self.cancel.cancel();
        self.teardown().await;
        err
    }
}
