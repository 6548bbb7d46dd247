//! Mock media engine.
//!
//! [`MockPeerFactory`] hands out [`MockPeerConnection`]s that record every
//! call in order. Gathered candidates and inbound tracks are scripted on the
//! factory and emitted on the event channel at the points a real engine
//! would produce them:
//!
//! - candidates after `set_local_description`
//! - remote tracks after `set_remote_description`
//!
//! # Example
//!
//! ```rust,ignore
//! use live_test_utils::MockPeerFactory;
//!
//! let peers = MockPeerFactory::new()
//!     .with_candidates(vec![host_candidate(1)])
//!     .with_remote_tracks(vec![RemoteTrack::new("v1", MediaKind::Video)]);
//!
//! // After the flow ran:
//! let peer = peers.last().unwrap();
//! assert_eq!(peer.count(|c| matches!(c, PeerCall::CreateOffer)), 1);
//! ```

use async_trait::async_trait;
use live_signaling::media::{LocalTrack, RemoteTrack};
use live_signaling::model::{IceCandidate, SdpType, SessionDescription};
use live_signaling::peer::{PeerConfig, PeerConnection, PeerConnectionFactory, PeerError, PeerEvent};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

const EVENT_CAPACITY: usize = 64;

/// One call made on a [`MockPeerConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocalDescription(SdpType),
    SetRemoteDescription(SdpType),
    AddIceCandidate(IceCandidate),
    Close,
}

#[derive(Debug, Clone, Default)]
struct Script {
    candidates: Vec<IceCandidate>,
    remote_tracks: Vec<RemoteTrack>,
    reject_remote_description: bool,
}

#[derive(Default)]
struct PeerInner {
    calls: Vec<PeerCall>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    events: Option<mpsc::Sender<PeerEvent>>,
    closed: bool,
}

/// A recorded, scriptable peer connection.
pub struct MockPeerConnection {
    label: String,
    script: Script,
    inner: Mutex<PeerInner>,
}

impl MockPeerConnection {
    fn new(label: String, script: Script, events: mpsc::Sender<PeerEvent>) -> Self {
        Self {
            label,
            script,
            inner: Mutex::new(PeerInner {
                events: Some(events),
                ..PeerInner::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PeerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call`, failing if the connection is closed.
    fn record(&self, call: PeerCall) -> Result<(), PeerError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(PeerError::Closed);
        }
        inner.calls.push(call);
        Ok(())
    }

    fn sender(&self) -> Option<mpsc::Sender<PeerEvent>> {
        self.lock().events.clone()
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<PeerCall> {
        self.lock().calls.clone()
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&PeerCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Candidates handed to `add_ice_candidate`, in order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                PeerCall::AddIceCandidate(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn local(&self) -> Option<SessionDescription> {
        self.lock().local.clone()
    }

    pub fn remote(&self) -> Option<SessionDescription> {
        self.lock().remote.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Inject an engine event. Returns `false` once the connection is
    /// closed or the session stopped listening.
    pub async fn emit(&self, event: PeerEvent) -> bool {
        match self.sender() {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), PeerError> {
        self.record(PeerCall::AddTrack(track.id().to_string()))
    }

    async fn create_offer(&self) -> Result<SessionDescription, PeerError> {
        self.record(PeerCall::CreateOffer)?;
        Ok(SessionDescription::offer(format!("v=0 o={} offer", self.label)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
        self.record(PeerCall::CreateAnswer)?;
        if self.lock().remote.is_none() {
            return Err(PeerError::CreateAnswer("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer(format!("v=0 o={} answer", self.label)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(PeerCall::SetLocalDescription(desc.sdp_type))?;
        self.lock().local = Some(desc);

        for candidate in &self.script.candidates {
            self.emit(PeerEvent::IceCandidate(candidate.clone())).await;
        }
        if !self.script.candidates.is_empty() {
            self.emit(PeerEvent::IceGatheringComplete).await;
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError> {
        self.record(PeerCall::SetRemoteDescription(desc.sdp_type))?;
        if self.script.reject_remote_description {
            return Err(PeerError::SetRemoteDescription(
                "malformed session description".to_string(),
            ));
        }
        self.lock().remote = Some(desc);

        for track in &self.script.remote_tracks {
            self.emit(PeerEvent::Track(track.clone())).await;
        }
        Ok(())
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        self.remote()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        if self.lock().remote.is_none() {
            return Err(PeerError::AddIceCandidate(
                "remote description not set".to_string(),
            ));
        }
        self.record(PeerCall::AddIceCandidate(candidate))
    }

    async fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            inner.calls.push(PeerCall::Close);
            inner.events = None;
        }
    }
}

/// Factory for [`MockPeerConnection`]s. Keeps every connection it created.
#[derive(Default)]
pub struct MockPeerFactory {
    script: Script,
    fail_create: bool,
    created: Mutex<Vec<Arc<MockPeerConnection>>>,
    configs: Mutex<Vec<PeerConfig>>,
}

impl MockPeerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates each connection "gathers" after its local description.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<IceCandidate>) -> Self {
        self.script.candidates = candidates;
        self
    }

    /// Tracks each connection receives once a remote description is set.
    #[must_use]
    pub fn with_remote_tracks(mut self, tracks: Vec<RemoteTrack>) -> Self {
        self.script.remote_tracks = tracks;
        self
    }

    /// Reject every remote description.
    #[must_use]
    pub fn rejecting_remote_description(mut self) -> Self {
        self.script.reject_remote_description = true;
        self
    }

    /// Fail `create` itself.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn connections(&self) -> Vec<Arc<MockPeerConnection>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recently created connection.
    pub fn last(&self) -> Option<Arc<MockPeerConnection>> {
        self.connections().pop()
    }

    /// Configurations passed to `create`.
    pub fn configs(&self) -> Vec<PeerConfig> {
        self.configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerFactory {
    async fn create(
        &self,
        config: &PeerConfig,
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerEvent>), PeerError> {
        self.configs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.clone());
        if self.fail_create {
            return Err(PeerError::Closed);
        }

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let mut created = self.created.lock().unwrap_or_else(PoisonError::into_inner);
        let peer = Arc::new(MockPeerConnection::new(
            format!("mock-peer-{}", created.len() + 1),
            self.script.clone(),
            tx,
        ));
        created.push(Arc::clone(&peer));
        Ok((peer, rx))
    }
}
