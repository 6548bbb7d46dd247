//! Live broadcast signaling library.
//!
//! Provides the live-streaming core of the video-sharing application:
//!
//! - A shared stream record (the signaling store) keyed by stream id
//! - A broadcaster flow that publishes local media and an offer
//! - A viewer flow that answers and renders inbound media
//! - A managed-room adapter that delegates to an external conferencing service
//! - One session interface over both backends, selected by configuration
//!
//! # Architecture
//!
//! ```text
//! LiveService (backend chosen by Config::backend)
//! ├── custom
//! │   ├── BroadcastSession ─┐
//! │   └── ViewerSession ────┴── SignalingStore (in-memory | Redis)
//! │                             PeerConnectionFactory (media engine)
//! └── managed
//!     └── ManagedSession ────── RoomTokenClient + RoomConnector (room SDK)
//! ```
//!
//! The media engine, the room SDK and camera/microphone access are external
//! collaborators behind traits ([`peer::PeerConnectionFactory`],
//! [`managed::RoomConnector`], [`media::MediaDevices`]).
//!
//! # Modules
//!
//! - [`store`] - Signaling store trait and backends
//! - [`broadcaster`] / [`viewer`] - Custom signaling flows
//! - [`managed`] - Managed-room adapter
//! - [`backend`] - Unified session interface
//! - [`api`] - Stream lifecycle REST client
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with client-safe messages

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod backend;
pub mod broadcaster;
pub mod config;
pub mod errors;
pub mod managed;
pub mod media;
pub mod model;
pub mod negotiation;
pub mod observability;
pub mod peer;
mod peer_session;
pub mod state;
pub mod store;
pub mod viewer;

pub use backend::{Collaborators, LiveService, LiveSession};
pub use config::{BackendKind, Config};
pub use errors::LiveError;
pub use state::{SessionRole, SessionState};
