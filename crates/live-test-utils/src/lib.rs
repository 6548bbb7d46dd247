//! # Live Test Utilities
//!
//! Stand-ins for the external collaborators of the live signaling crate,
//! so broadcaster, viewer and managed-room flows can run in-process.
//!
//! ## Modules
//!
//! - `mock_peer` - Scriptable media engine that records every call
//! - `mock_media` - Camera/microphone access that grants or denies
//! - `mock_room` - Managed room SDK with event injection
//! - `fixtures` - Session contexts, stores, candidates and wait helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = seeded_store(&stream_id()).await;
//!     let peers = MockPeerFactory::new()
//!         .with_candidates(vec![host_candidate(1)]);
//!     let media = MockMediaDevices::granting();
//!
//!     let deps = SignalingDeps::new(store, Arc::new(peers), Arc::new(media));
//!     // Run your flow...
//! }
//! ```

pub mod fixtures;
pub mod mock_media;
pub mod mock_peer;
pub mod mock_room;

pub use fixtures::*;
pub use mock_media::*;
pub use mock_peer::*;
pub use mock_room::*;
