//! Managed-room backend.
//!
//! Room join/leave and participant media are delegated to a hosted
//! conferencing service. This module exchanges the stream id for a room
//! token and keeps the session's view of participants and their tracks in
//! sync with room notifications.

mod room;
mod session;
mod token;

pub use room::{
    ConnectOptions, NetworkQualityLevels, RemoteParticipant, Room, RoomConnector, RoomError,
    RoomEvent, VideoCodecPreference,
};
pub use session::{ManagedDeps, ManagedSession};
pub use token::{RoomGrant, RoomTokenClient};
