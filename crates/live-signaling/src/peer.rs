//! Media engine seam.
//!
//! The engine (an `RTCPeerConnection` equivalent) is external. Sessions talk
//! to it through [`PeerConnection`] and receive its callbacks as
//! [`PeerEvent`]s on an mpsc channel.

use crate::media::{LocalTrack, RemoteTrack};
use crate::model::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Public STUN servers used when none are configured.
pub const DEFAULT_STUN_URLS: [&str; 2] = [
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
}

/// Peer connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub ice_servers: Vec<IceServer>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::with_stun_urls(DEFAULT_STUN_URLS.iter().map(ToString::to_string).collect())
    }
}

impl PeerConfig {
    #[must_use]
    pub fn with_stun_urls(urls: Vec<String>) -> Self {
        Self {
            ice_servers: vec![IceServer { urls }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Engine callbacks.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local candidate was gathered.
    IceCandidate(IceCandidate),
    /// Gathering finished.
    IceGatheringComplete,
    /// An inbound track arrived.
    Track(RemoteTrack),
    ConnectionStateChanged(PeerConnectionState),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Failed to create offer: {0}")]
    CreateOffer(String),

    #[error("Failed to create answer: {0}")]
    CreateAnswer(String),

    #[error("Failed to set local description: {0}")]
    SetLocalDescription(String),

    #[error("Failed to set remote description: {0}")]
    SetRemoteDescription(String),

    #[error("Failed to add ICE candidate: {0}")]
    AddIceCandidate(String),

    #[error("Failed to add track: {0}")]
    AddTrack(String),

    #[error("Peer connection is closed")]
    Closed,
}

/// One peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: &LocalTrack) -> Result<(), PeerError>;

    async fn create_offer(&self) -> Result<SessionDescription, PeerError>;

    async fn create_answer(&self) -> Result<SessionDescription, PeerError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), PeerError>;

    /// The applied remote description, if any.
    async fn remote_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// Creates peer connections plus the channel their events arrive on.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &PeerConfig,
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerEvent>), PeerError>;
}
