//! Local and remote media handles.
//!
//! Capture itself belongs to the platform; this module models the track
//! handles the signaling flows hold, toggle and release.

use async_trait::async_trait;
use common::types::ParticipantId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Track ready state. Once `Ended` a track never goes live again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: MediaKind,
    label: String,
    enabled: AtomicBool,
    ended: AtomicBool,
}

/// A captured camera or microphone track.
///
/// Cloning yields another handle to the same track.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    inner: Arc<TrackInner>,
}

impl LocalTrack {
    #[must_use]
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ended: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Mute or unmute. Ignored once the track has ended.
    pub fn set_enabled(&self, enabled: bool) {
        if !self.is_ended() {
            self.inner.enabled.store(enabled, Ordering::Release);
        }
    }

    /// Stop capture. Idempotent.
    pub fn stop(&self) {
        self.inner.enabled.store(false, Ordering::Release);
        self.inner.ended.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn ready_state(&self) -> TrackState {
        if self.is_ended() {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same track.
    #[must_use]
    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Local capture owned by a session for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<LocalTrack>,
}

impl MediaStream {
    #[must_use]
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    #[must_use]
    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: MediaKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    /// Enable or disable every track of `kind`. Returns how many changed.
    pub fn set_enabled(&self, kind: MediaKind, enabled: bool) -> usize {
        let mut changed = 0;
        for track in self.tracks_of(kind) {
            if track.enabled() != enabled && track.ready_state() == TrackState::Live {
                track.set_enabled(enabled);
                changed += 1;
            }
        }
        changed
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// An inbound track delivered by the media engine or the room SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    /// Set on the managed path, where tracks belong to room participants.
    pub participant: Option<ParticipantId>,
}

impl RemoteTrack {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            participant: None,
        }
    }

    #[must_use]
    pub fn from_participant(mut self, participant: ParticipantId) -> Self {
        self.participant = Some(participant);
        self
    }
}

/// Inbound media collected for rendering.
///
/// A shared handle: the session's pumps add and remove tracks while the
/// presentation layer reads the current set.
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    tracks: Arc<Mutex<Vec<RemoteTrack>>>,
}

impl RemoteStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track unless one with the same id is present.
    pub fn add(&self, track: RemoteTrack) -> bool {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        if tracks.iter().any(|t| t.id == track.id) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub fn remove(&self, track_id: &str) -> Option<RemoteTrack> {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = tracks.iter().position(|t| t.id == track_id)?;
        Some(tracks.remove(pos))
    }

    /// Remove every track owned by `participant`.
    pub fn remove_participant(&self, participant: &ParticipantId) -> usize {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = tracks.len();
        tracks.retain(|t| t.participant.as_ref() != Some(participant));
        before - tracks.len()
    }

    #[must_use]
    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Audio processing requested from the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl AudioConstraints {
    /// Voice processing for room calls.
    #[must_use]
    pub fn voice() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// What to capture. `None` means "do not capture this kind".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Camera and microphone with platform-default audio processing.
    #[must_use]
    pub fn camera_and_microphone() -> Self {
        Self {
            video: true,
            audio: Some(AudioConstraints {
                echo_cancellation: false,
                noise_suppression: false,
            }),
        }
    }

    #[must_use]
    pub fn video_only() -> Self {
        Self {
            video: true,
            audio: None,
        }
    }

    #[must_use]
    pub fn audio_only(constraints: AudioConstraints) -> Self {
        Self {
            video: false,
            audio: Some(constraints),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Capture failed: {0}")]
    Capture(String),
}

/// Camera and microphone access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Prompt for and open capture devices.
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_ends_and_disables() {
        let track = LocalTrack::new(MediaKind::Video, "Front camera");
        track.stop();
        assert_eq!(track.ready_state(), TrackState::Ended);
        assert!(!track.enabled());

        // An ended track cannot be unmuted
        track.set_enabled(true);
        assert!(!track.enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let track = LocalTrack::new(MediaKind::Audio, "mic");
        let other = track.clone();
        other.set_enabled(false);
        assert!(!track.enabled());
        assert!(track.same_track(&other));
    }

    #[test]
    fn test_stream_toggle_touches_only_one_kind() {
        let stream = MediaStream::new(vec![
            LocalTrack::new(MediaKind::Video, "cam"),
            LocalTrack::new(MediaKind::Audio, "mic"),
        ]);

        assert_eq!(stream.set_enabled(MediaKind::Audio, false), 1);
        assert!(stream.tracks_of(MediaKind::Video).all(LocalTrack::enabled));
        assert!(!stream.tracks_of(MediaKind::Audio).any(LocalTrack::enabled));

        // Already disabled
        assert_eq!(stream.set_enabled(MediaKind::Audio, false), 0);
    }

    #[test]
    fn test_remote_stream_dedupes_by_id() {
        let remote = RemoteStream::new();
        assert!(remote.add(RemoteTrack::new("t1", MediaKind::Video)));
        assert!(!remote.add(RemoteTrack::new("t1", MediaKind::Video)));
        assert_eq!(remote.len(), 1);
    }

    #[test]
    fn test_remove_participant_detaches_only_their_tracks() {
        let alice = ParticipantId::from("alice");
        let bob = ParticipantId::from("bob");
        let remote = RemoteStream::new();
        remote.add(RemoteTrack::new("a-v", MediaKind::Video).from_participant(alice.clone()));
        remote.add(RemoteTrack::new("a-a", MediaKind::Audio).from_participant(alice.clone()));
        remote.add(RemoteTrack::new("b-v", MediaKind::Video).from_participant(bob));

        assert_eq!(remote.remove_participant(&alice), 2);
        assert_eq!(remote.tracks()[0].id, "b-v");
    }
}
