//! One session interface over both live backends.
//!
//! [`LiveService`] is built once from [`Config`] and the injected
//! collaborators. It hands out [`LiveSession`]s on whichever backend the
//! configuration selects, each tied to the session context so that signing
//! out tears every session down.

use crate::broadcaster::{BroadcastSession, PreviewCallback, SignalingDeps};
use crate::config::{BackendKind, Config};
use crate::errors::LiveError;
use crate::managed::{ManagedDeps, ManagedSession, RoomConnector, RoomTokenClient};
use crate::media::{MediaDevices, MediaStream, RemoteStream};
use crate::peer::PeerConnectionFactory;
use crate::state::{SessionRole, SessionState};
use crate::store::{RedisSignalingStore, SignalingStore};
use crate::viewer::{ErrorCallback, ViewerSession};
use async_trait::async_trait;
use common::session::SessionContext;
use common::types::StreamId;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

/// A running live session, whatever the backend.
#[async_trait]
pub trait LiveSession: Send + Sync {
    fn stream_id(&self) -> &StreamId;

    fn role(&self) -> SessionRole;

    fn backend(&self) -> BackendKind;

    /// Current state.
    fn state(&self) -> SessionState;

    fn subscribe_state(&self) -> watch::Receiver<SessionState>;

    /// Captured media, for preview. `None` for receive-only sessions.
    async fn local_stream(&self) -> Option<MediaStream>;

    /// Inbound media, for rendering.
    fn remote_stream(&self) -> RemoteStream;

    async fn toggle_audio(&self, enabled: bool);

    async fn toggle_video(&self, enabled: bool);

    /// End (broadcaster) or leave (viewer) the stream.
    async fn end(&self) -> Result<(), LiveError>;
}

#[async_trait]
impl LiveSession for BroadcastSession {
    fn stream_id(&self) -> &StreamId {
        BroadcastSession::stream_id(self)
    }

    fn role(&self) -> SessionRole {
        SessionRole::Broadcaster
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Custom
    }

    fn state(&self) -> SessionState {
        BroadcastSession::state(self)
    }

    fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        BroadcastSession::subscribe_state(self)
    }

    async fn local_stream(&self) -> Option<MediaStream> {
        BroadcastSession::local_stream(self).await
    }

    fn remote_stream(&self) -> RemoteStream {
        BroadcastSession::remote_stream(self)
    }

    async fn toggle_audio(&self, enabled: bool) {
        BroadcastSession::toggle_audio(self, enabled).await;
    }

    async fn toggle_video(&self, enabled: bool) {
        BroadcastSession::toggle_video(self, enabled).await;
    }

    async fn end(&self) -> Result<(), LiveError> {
        BroadcastSession::end(self).await
    }
}

#[async_trait]
impl LiveSession for ViewerSession {
    fn stream_id(&self) -> &StreamId {
        ViewerSession::stream_id(self)
    }

    fn role(&self) -> SessionRole {
        SessionRole::Viewer
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Custom
    }

    fn state(&self) -> SessionState {
        ViewerSession::state(self)
    }

    fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        ViewerSession::subscribe_state(self)
    }

    async fn local_stream(&self) -> Option<MediaStream> {
        ViewerSession::local_stream(self).await
    }

    fn remote_stream(&self) -> RemoteStream {
        ViewerSession::remote_stream(self)
    }

    async fn toggle_audio(&self, enabled: bool) {
        ViewerSession::toggle_audio(self, enabled).await;
    }

    async fn toggle_video(&self, enabled: bool) {
        ViewerSession::toggle_video(self, enabled).await;
    }

    async fn end(&self) -> Result<(), LiveError> {
        self.leave().await;
        Ok(())
    }
}

#[async_trait]
impl LiveSession for ManagedSession {
    fn stream_id(&self) -> &StreamId {
        ManagedSession::stream_id(self)
    }

    fn role(&self) -> SessionRole {
        ManagedSession::role(self)
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Managed
    }

    fn state(&self) -> SessionState {
        ManagedSession::state(self)
    }

    fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        ManagedSession::subscribe_state(self)
    }

    async fn local_stream(&self) -> Option<MediaStream> {
        ManagedSession::local_stream(self).await
    }

    fn remote_stream(&self) -> RemoteStream {
        ManagedSession::remote_stream(self)
    }

    async fn toggle_audio(&self, enabled: bool) {
        ManagedSession::toggle_audio(self, enabled).await;
    }

    async fn toggle_video(&self, enabled: bool) {
        ManagedSession::toggle_video(self, enabled).await;
    }

    async fn end(&self) -> Result<(), LiveError> {
        self.leave().await;
        Ok(())
    }
}

/// External collaborators injected at start-up.
///
/// Only the ones the configured backend needs have to be present.
#[derive(Clone)]
pub struct Collaborators {
    pub session: Arc<SessionContext>,
    pub media: Arc<dyn MediaDevices>,
    pub store: Option<Arc<dyn SignalingStore>>,
    pub peers: Option<Arc<dyn PeerConnectionFactory>>,
    pub rooms: Option<Arc<dyn RoomConnector>>,
}

impl Collaborators {
    #[must_use]
    pub fn new(session: Arc<SessionContext>, media: Arc<dyn MediaDevices>) -> Self {
        Self {
            session,
            media,
            store: None,
            peers: None,
            rooms: None,
        }
    }

    /// Signaling store and media engine for the custom backend.
    #[must_use]
    pub fn with_custom(
        mut self,
        store: Arc<dyn SignalingStore>,
        peers: Arc<dyn PeerConnectionFactory>,
    ) -> Self {
        self.store = Some(store);
        self.peers = Some(peers);
        self
    }

    /// Room SDK for the managed backend.
    #[must_use]
    pub fn with_managed(mut self, rooms: Arc<dyn RoomConnector>) -> Self {
        self.rooms = Some(rooms);
        self
    }
}

/// Open the shared signaling store for the custom backend.
///
/// Broadcaster and viewer usually run in different processes, so the
/// store is always Redis; `InMemorySignalingStore` is for tests.
///
/// # Errors
///
/// - `LiveError::Config` if `REDIS_URL` is not set
/// - `LiveError::Store` if Redis is unreachable
pub async fn open_store(config: &Config) -> Result<Arc<dyn SignalingStore>, LiveError> {
    let url = config.require_redis_url()?;
    Ok(Arc::new(RedisSignalingStore::connect(url).await?))
}

enum Backend {
    Custom(SignalingDeps),
    Managed(ManagedDeps),
}

/// Entry point for starting and watching streams.
pub struct LiveService {
    backend: Backend,
    session: Arc<SessionContext>,
}

impl LiveService {
    /// # Errors
    ///
    /// `LiveError::Config` if a collaborator the configured backend needs
    /// is missing.
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self, LiveError> {
        let Collaborators {
            session,
            media,
            store,
            peers,
            rooms,
        } = collaborators;

        let backend = match config.backend {
            BackendKind::Custom => {
                let (Some(store), Some(peers)) = (store, peers) else {
                    return Err(LiveError::Config(
                        "custom backend needs a signaling store and a peer connection factory"
                            .to_string(),
                    ));
                };
                let mut deps = SignalingDeps::new(store, peers, media);
                deps.peer_config = config.peer_config();
                deps.answer_timeout = config.answer_timeout;
                Backend::Custom(deps)
            }
            BackendKind::Managed => {
                let Some(rooms) = rooms else {
                    return Err(LiveError::Config(
                        "managed backend needs a room connector".to_string(),
                    ));
                };
                Backend::Managed(ManagedDeps {
                    tokens: RoomTokenClient::from_config(config, Arc::clone(&session))?,
                    rooms,
                    media,
                    max_audio_bitrate: config.max_audio_bitrate,
                })
            }
        };

        info!(target: "live.backend", backend = %config.backend, "Live service ready");
        Ok(Self { backend, session })
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        match self.backend {
            Backend::Custom(_) => BackendKind::Custom,
            Backend::Managed(_) => BackendKind::Managed,
        }
    }

    /// Go live on `stream_id`.
    ///
    /// The returned session is `Connecting` (custom, waiting for a viewer)
    /// or `Live` (managed).
    ///
    /// # Errors
    ///
    /// `LiveError::Unauthenticated` when signed out, or whatever the
    /// backend's start-up fails with. A failed session is torn down.
    #[instrument(skip_all, fields(stream_id = %stream_id, backend = %self.backend_kind()))]
    pub async fn start_broadcast(
        &self,
        stream_id: StreamId,
        preview: PreviewCallback,
    ) -> Result<Arc<dyn LiveSession>, LiveError> {
        if !self.session.is_authenticated() {
            return Err(LiveError::Unauthenticated);
        }
        let cancel = self.session.child_token();

        match &self.backend {
            Backend::Custom(deps) => {
                let session = Arc::new(BroadcastSession::new(stream_id, deps.clone(), cancel));
                session.start(preview).await?;
                Ok(session)
            }
            Backend::Managed(deps) => {
                let session = Arc::new(ManagedSession::new(
                    stream_id,
                    SessionRole::Broadcaster,
                    deps.clone(),
                    cancel,
                ));
                session.join().await?;
                if let Some(local) = session.local_stream().await {
                    preview(&local);
                }
                Ok(session)
            }
        }
    }

    /// Watch `stream_id`. Failures after connecting are reported through
    /// `on_error` with a client-safe message.
    ///
    /// # Errors
    ///
    /// `LiveError::Unauthenticated` when signed out, or whatever the
    /// backend's join fails with.
    #[instrument(skip_all, fields(stream_id = %stream_id, backend = %self.backend_kind()))]
    pub async fn watch_stream(
        &self,
        stream_id: StreamId,
        on_error: ErrorCallback,
    ) -> Result<Arc<dyn LiveSession>, LiveError> {
        if !self.session.is_authenticated() {
            return Err(LiveError::Unauthenticated);
        }
        let cancel = self.session.child_token();

        match &self.backend {
            Backend::Custom(deps) => {
                let session = Arc::new(ViewerSession::new(stream_id, deps.clone(), cancel, on_error));
                session.join().await?;
                Ok(session)
            }
            Backend::Managed(deps) => {
                let session = Arc::new(ManagedSession::new(
                    stream_id,
                    SessionRole::Viewer,
                    deps.clone(),
                    cancel,
                ));
                session.join().await?;
                Ok(session)
            }
        }
    }
}
