//! Managed room SDK seam.

use crate::errors::LiveError;
use crate::media::{LocalTrack, RemoteTrack};
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::ParticipantId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Preferred video codec for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCodecPreference {
    pub codec: String,
    pub simulcast: bool,
}

impl VideoCodecPreference {
    /// VP8 with simulcast layers.
    #[must_use]
    pub fn vp8_simulcast() -> Self {
        Self {
            codec: "VP8".to_string(),
            simulcast: true,
        }
    }
}

/// Network quality reporting verbosity (0 disables, 1 is minimal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkQualityLevels {
    pub local: u8,
    pub remote: u8,
}

/// Options passed to [`RoomConnector::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub room_name: String,
    pub tracks: Vec<LocalTrack>,
    pub dominant_speaker: bool,
    pub network_quality: NetworkQualityLevels,
    /// Bits per second.
    pub max_audio_bitrate: u32,
    pub preferred_video_codecs: Vec<VideoCodecPreference>,
}

impl ConnectOptions {
    /// Options used for every live room: dominant speaker detection,
    /// minimal network quality reporting and VP8 simulcast.
    #[must_use]
    pub fn for_live_room(
        room_name: impl Into<String>,
        tracks: Vec<LocalTrack>,
        max_audio_bitrate: u32,
    ) -> Self {
        Self {
            room_name: room_name.into(),
            tracks,
            dominant_speaker: true,
            network_quality: NetworkQualityLevels { local: 1, remote: 1 },
            max_audio_bitrate,
            preferred_video_codecs: vec![VideoCodecPreference::vp8_simulcast()],
        }
    }
}

/// A participant already in the room or joining it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub identity: String,
    /// Tracks this client is currently subscribed to.
    pub tracks: Vec<RemoteTrack>,
}

/// Room notifications.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ParticipantConnected(RemoteParticipant),
    ParticipantDisconnected(ParticipantId),
    TrackSubscribed {
        participant: ParticipantId,
        track: RemoteTrack,
    },
    TrackUnsubscribed {
        participant: ParticipantId,
        track_id: String,
    },
    DominantSpeakerChanged(Option<ParticipantId>),
    /// The room connection is gone (remote end, network, or `disconnect`).
    Disconnected { reason: Option<String> },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Failed to connect to room: {0}")]
    Connect(String),

    #[error("Room access token rejected")]
    TokenRejected,
}

impl From<RoomError> for LiveError {
    fn from(err: RoomError) -> Self {
        LiveError::Room(err.to_string())
    }
}

/// A connected room.
#[async_trait]
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Participants present at connect time.
    fn participants(&self) -> Vec<RemoteParticipant>;

    async fn disconnect(&self);
}

/// Entry point of the conferencing SDK.
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(
        &self,
        token: &SecretString,
        options: ConnectOptions,
    ) -> Result<(Arc<dyn Room>, mpsc::Receiver<RoomEvent>), RoomError>;
}
