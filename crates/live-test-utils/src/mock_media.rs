//! Mock camera and microphone access.

use async_trait::async_trait;
use live_signaling::media::{LocalTrack, MediaConstraints, MediaDevices, MediaError, MediaKind, MediaStream};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    Grant,
    Deny,
    /// Video is granted, anything asking for audio is refused.
    DenyAudio,
}

/// Grants or refuses capture and remembers every track it handed out.
#[derive(Debug)]
pub struct MockMediaDevices {
    permission: Permission,
    requests: Mutex<Vec<MediaConstraints>>,
    issued: Mutex<Vec<LocalTrack>>,
}

impl MockMediaDevices {
    fn with(permission: Permission) -> Self {
        Self {
            permission,
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn granting() -> Self {
        Self::with(Permission::Grant)
    }

    #[must_use]
    pub fn denying() -> Self {
        Self::with(Permission::Deny)
    }

    #[must_use]
    pub fn denying_audio() -> Self {
        Self::with(Permission::DenyAudio)
    }

    /// Constraints of every request, in order.
    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every track handed out so far.
    pub fn issued(&self) -> Vec<LocalTrack> {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(constraints);

        match self.permission {
            Permission::Deny => return Err(MediaError::PermissionDenied),
            Permission::DenyAudio if constraints.audio.is_some() => {
                return Err(MediaError::PermissionDenied)
            }
            _ => {}
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(LocalTrack::new(MediaKind::Video, "Mock camera"));
        }
        if constraints.audio.is_some() {
            tracks.push(LocalTrack::new(MediaKind::Audio, "Mock microphone"));
        }
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tracks.iter().cloned());
        Ok(MediaStream::new(tracks))
    }
}
