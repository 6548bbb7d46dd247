//! A live session hosted in a managed room.

use super::room::{ConnectOptions, RemoteParticipant, Room, RoomConnector, RoomEvent};
use super::token::RoomTokenClient;
use crate::config::BackendKind;
use crate::errors::LiveError;
use crate::media::{
    AudioConstraints, MediaConstraints, MediaDevices, MediaKind, MediaStream, RemoteStream,
};
use crate::observability::metrics;
use crate::state::{SessionRole, SessionState, SessionStateTracker};
use common::types::{ParticipantId, StreamId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Collaborators of the managed path.
#[derive(Clone)]
pub struct ManagedDeps {
    pub tokens: RoomTokenClient,
    pub rooms: Arc<dyn RoomConnector>,
    pub media: Arc<dyn MediaDevices>,
    pub max_audio_bitrate: u32,
}

#[derive(Default)]
struct RoomParts {
    room: Option<Arc<dyn Room>>,
    local: Option<MediaStream>,
    participants: HashMap<ParticipantId, RemoteParticipant>,
    dominant_speaker: Option<ParticipantId>,
}

/// Publisher or subscriber in a managed room.
pub struct ManagedSession {
    stream_id: StreamId,
    deps: ManagedDeps,
    state: SessionStateTracker,
    cancel: CancellationToken,
    parts: Arc<Mutex<RoomParts>>,
    remote: RemoteStream,
}

impl ManagedSession {
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        role: SessionRole,
        deps: ManagedDeps,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream_id,
            deps,
            state: SessionStateTracker::new(role),
            cancel,
            parts: Arc::new(Mutex::new(RoomParts::default())),
            remote: RemoteStream::new(),
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.state.role()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn local_stream(&self) -> Option<MediaStream> {
        self.parts.lock().await.local.clone()
    }

    #[must_use]
    pub fn remote_stream(&self) -> RemoteStream {
        self.remote.clone()
    }

    pub async fn participants(&self) -> Vec<RemoteParticipant> {
        self.parts.lock().await.participants.values().cloned().collect()
    }

    /// Remote participants currently in the room.
    pub async fn viewer_count(&self) -> usize {
        self.parts.lock().await.participants.len()
    }

    pub async fn dominant_speaker(&self) -> Option<ParticipantId> {
        self.parts.lock().await.dominant_speaker.clone()
    }

    /// Join the room for this stream. A broadcaster publishes camera and
    /// microphone; a viewer only subscribes.
    ///
    /// # Errors
    ///
    /// - `LiveError::Unauthenticated` if nobody is signed in
    /// - `LiveError::MediaPermissionDenied` if capture is refused
    /// - `LiveError::TokenExchange` / `LiveError::Room` if joining fails
    #[instrument(skip_all, fields(stream_id = %self.stream_id, role = %self.role()))]
    pub async fn join(&self) -> Result<(), LiveError> {
        let publish = self.role() == SessionRole::Broadcaster;
        let first = if publish {
            SessionState::AcquiringMedia
        } else {
            SessionState::Connecting
        };
        self.state.transition(first)?;
        metrics::record_session_started(self.role(), BackendKind::Managed);

        match self.connect(publish).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn connect(&self, publish: bool) -> Result<(), LiveError> {
        if !self.deps.tokens.has_session() {
            return Err(LiveError::Unauthenticated);
        }

        let tracks = if publish {
            let local = self.acquire_tracks().await?;
            let tracks = local.tracks().to_vec();
            self.parts.lock().await.local = Some(local);
            self.state.transition(SessionState::Connecting)?;
            tracks
        } else {
            Vec::new()
        };

        let grant = self.deps.tokens.fetch(&self.stream_id).await?;
        let options =
            ConnectOptions::for_live_room(&grant.room_name, tracks, self.deps.max_audio_bitrate);
        let (room, events) = self.deps.rooms.connect(&grant.token, options).await?;

        if self.cancel.is_cancelled() {
            room.disconnect().await;
            release(&self.parts, &self.remote).await;
            self.state.finish();
            return Ok(());
        }

        let present = room.participants();
        {
            let mut parts = self.parts.lock().await;
            parts.room = Some(Arc::clone(&room));
            for participant in present {
                attach_participant(&self.remote, &mut parts, participant);
            }
            metrics::set_room_participants(parts.participants.len());
        }

        self.state.transition(SessionState::Live)?;
        info!(
            target: "live.managed",
            room = %room.name(),
            "Joined managed room"
        );

        tokio::spawn(run_room_events(
            self.stream_id.clone(),
            self.state.clone(),
            self.cancel.clone(),
            Arc::clone(&self.parts),
            self.remote.clone(),
            events,
        ));
        Ok(())
    }

    /// One video track plus one microphone track with voice processing.
    async fn acquire_tracks(&self) -> Result<MediaStream, LiveError> {
        let video = self
            .deps
            .media
            .get_user_media(MediaConstraints::video_only())
            .await?;
        let audio = match self
            .deps
            .media
            .get_user_media(MediaConstraints::audio_only(AudioConstraints::voice()))
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                video.stop_all();
                return Err(e.into());
            }
        };

        let tracks = video
            .tracks_of(MediaKind::Video)
            .take(1)
            .chain(audio.tracks_of(MediaKind::Audio).take(1))
            .cloned()
            .collect();
        Ok(MediaStream::new(tracks))
    }

    /// Enable or disable the first local audio track.
    pub async fn toggle_audio(&self, enabled: bool) {
        self.toggle_first(MediaKind::Audio, enabled).await;
    }

    /// Enable or disable the first local video track.
    pub async fn toggle_video(&self, enabled: bool) {
        self.toggle_first(MediaKind::Video, enabled).await;
    }

    async fn toggle_first(&self, kind: MediaKind, enabled: bool) {
        let parts = self.parts.lock().await;
        if let Some(track) = parts.local.as_ref().and_then(|l| l.tracks_of(kind).next()) {
            track.set_enabled(enabled);
        }
    }

    /// Stop local tracks, disconnect and forget participants.
    pub async fn leave(&self) {
        if self.state.finish() {
            info!(target: "live.managed", stream_id = %self.stream_id, "Left managed room");
        }
        self.cancel.cancel();
        release(&self.parts, &self.remote).await;
    }

    async fn fail(&self, err: LiveError) -> LiveError {
        error!(
            target: "live.managed",
            stream_id = %self.stream_id,
            error = %err,
            "Managed session failed"
        );
        metrics::record_session_failure(self.role(), err.reason());
        if !self.state.fail() {
            self.state.finish();
        }
        self.cancel.cancel();
        release(&self.parts, &self.remote).await;
        err
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn attach_participant(
    remote: &RemoteStream,
    parts: &mut RoomParts,
    participant: RemoteParticipant,
) {
    for track in &participant.tracks {
        remote.add(track.clone().from_participant(participant.id.clone()));
    }
    parts.participants.insert(participant.id.clone(), participant);
}

async fn release(parts: &Mutex<RoomParts>, remote: &RemoteStream) {
    let (room, local) = {
        let mut parts = parts.lock().await;
        parts.participants.clear();
        parts.dominant_speaker = None;
        (parts.room.take(), parts.local.clone())
    };
    if let Some(local) = local {
        local.stop_all();
    }
    if let Some(room) = room {
        room.disconnect().await;
    }
    remote.clear();
}

async fn run_room_events(
    stream_id: StreamId,
    state: SessionStateTracker,
    cancel: CancellationToken,
    parts: Arc<Mutex<RoomParts>>,
    remote: RemoteStream,
    mut events: mpsc::Receiver<RoomEvent>,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            None => break,
            Some(RoomEvent::Disconnected { reason }) => {
                info!(target: "live.managed", stream_id = %stream_id, ?reason, "Room disconnected");
                break;
            }
            Some(event) => handle_room_event(&stream_id, &parts, &remote, event).await,
        }
    }

    release(&parts, &remote).await;
    state.finish();
}

async fn handle_room_event(
    stream_id: &StreamId,
    parts: &Mutex<RoomParts>,
    remote: &RemoteStream,
    event: RoomEvent,
) {
    let mut parts = parts.lock().await;
    match event {
        RoomEvent::ParticipantConnected(participant) => {
            debug!(
                target: "live.managed",
                stream_id = %stream_id,
                participant = %participant.id,
                "Participant connected"
            );
            attach_participant(remote, &mut parts, participant);
        }
        RoomEvent::ParticipantDisconnected(id) => {
            let detached = remote.remove_participant(&id);
            parts.participants.remove(&id);
            if parts.dominant_speaker.as_ref() == Some(&id) {
                parts.dominant_speaker = None;
            }
            debug!(
                target: "live.managed",
                stream_id = %stream_id,
                participant = %id,
                detached,
                "Participant disconnected"
            );
        }
        RoomEvent::TrackSubscribed { participant, track } => {
            let track = track.from_participant(participant.clone());
            if let Some(entry) = parts.participants.get_mut(&participant) {
                if !entry.tracks.iter().any(|t| t.id == track.id) {
                    entry.tracks.push(track.clone());
                }
            }
            remote.add(track);
        }
        RoomEvent::TrackUnsubscribed {
            participant,
            track_id,
        } => {
            if let Some(entry) = parts.participants.get_mut(&participant) {
                entry.tracks.retain(|t| t.id != track_id);
            }
            remote.remove(&track_id);
        }
        RoomEvent::DominantSpeakerChanged(speaker) => {
            parts.dominant_speaker = speaker;
        }
        RoomEvent::Disconnected { .. } => {}
    }
    metrics::set_room_participants(parts.participants.len());
}
