//! Shared stream record and the signaling payloads it carries.
//!
//! The record is stored as camelCase JSON so that it stays readable by the
//! web and mobile clients that share it.

use chrono::{DateTime, Utc};
use common::types::StreamId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SDP type of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdpType::Offer => "offer",
            SdpType::Pranswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// An offer or answer as exchanged through the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Which peer discovered a candidate.
///
/// Records written before origins were tracked carry none; those candidates
/// were always written by the broadcaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    #[default]
    Broadcaster,
    Viewer,
}

impl CandidateOrigin {
    /// The origin whose candidates this side should apply.
    #[must_use]
    pub fn remote(self) -> Self {
        match self {
            CandidateOrigin::Broadcaster => CandidateOrigin::Viewer,
            CandidateOrigin::Viewer => CandidateOrigin::Broadcaster,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateOrigin::Broadcaster => "broadcaster",
            CandidateOrigin::Viewer => "viewer",
        }
    }
}

/// ICE candidate descriptor in its JSON (`RTCIceCandidateInit`) shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
    #[serde(default)]
    pub origin: CandidateOrigin,
}

impl IceCandidate {
    #[must_use]
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
            origin: CandidateOrigin::default(),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: CandidateOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Lifecycle status of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Scheduled,
    Live,
    Ended,
}

/// The shared document for one stream.
///
/// Written by whichever peer is acting; field writes are last-write-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub id: StreamId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub viewer_count: u32,
    #[serde(default)]
    pub chat_enabled: bool,
    #[serde(default)]
    pub recording_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<IceCandidate>,
    #[serde(default)]
    pub status: StreamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl StreamRecord {
    #[must_use]
    pub fn new(id: StreamId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            scheduled_for: None,
            is_live: false,
            viewer_count: 0,
            chat_enabled: true,
            recording_enabled: false,
            user_id: None,
            offer: None,
            answer: None,
            candidates: Vec::new(),
            status: StreamStatus::Scheduled,
            ended_at: None,
        }
    }

    /// Candidates discovered by `origin`.
    pub fn candidates_from(&self, origin: CandidateOrigin) -> impl Iterator<Item = &IceCandidate> {
        self.candidates.iter().filter(move |c| c.origin == origin)
    }

    /// Union-append: a candidate already present is not added again.
    /// Returns `true` if the list changed.
    pub fn push_candidate(&mut self, candidate: IceCandidate) -> bool {
        if self.candidates.contains(&candidate) {
            return false;
        }
        self.candidates.push(candidate);
        true
    }

    /// Drop offer, answer and candidates left behind by a previous session.
    pub fn clear_negotiation(&mut self) {
        self.offer = None;
        self.answer = None;
        self.candidates.clear();
    }
}

/// Partial update of a stream record. Only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StreamStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
}

impl RecordPatch {
    #[must_use]
    pub fn offer(offer: SessionDescription) -> Self {
        Self {
            offer: Some(offer),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn answer(answer: SessionDescription) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    /// Mark the stream ended at `at`.
    #[must_use]
    pub fn ended(at: DateTime<Utc>) -> Self {
        Self {
            is_live: Some(false),
            status: Some(StreamStatus::Ended),
            ended_at: Some(at),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the present fields to `record`.
    pub fn apply_to(&self, record: &mut StreamRecord) {
        if let Some(title) = &self.title {
            record.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
        if let Some(is_live) = self.is_live {
            record.is_live = is_live;
        }
        if let Some(viewer_count) = self.viewer_count {
            record.viewer_count = viewer_count;
        }
        if let Some(chat_enabled) = self.chat_enabled {
            record.chat_enabled = chat_enabled;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(ended_at) = self.ended_at {
            record.ended_at = Some(ended_at);
        }
        if let Some(offer) = &self.offer {
            record.offer = Some(offer.clone());
        }
        if let Some(answer) = &self.answer {
            record.answer = Some(answer.clone());
        }
    }
}
