//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use them for
//! every credential that passes through the signaling glue: identity tokens
//! from the auth provider, room access tokens from the token exchange, and
//! the signaling store URL (which may embed a password).
//!
//! `SecretString` implements `Debug` with redaction, so deriving `Debug` on a
//! struct that holds one is safe to log via `{:?}` or tracing fields.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct RoomGrant {
//!     room_name: String,
//!     token: SecretString,
//! }
//!
//! let grant = RoomGrant {
//!     room_name: "stream-42".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{grant:?}").contains("eyJhbGciOi"));
//! let bearer: &str = grant.token.expose_secret();
//! # assert_eq!(bearer, "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_id_token_debug_is_redacted() {
        let id_token = SecretString::from("id-token-abc");
        let debug_str = format!("{id_token:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("id-token-abc"));
    }

    #[test]
    fn test_room_grant_deserializes_without_leaking() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Grant {
            room_name: String,
            token: SecretString,
        }

        let json = r#"{"roomName": "stream-7", "token": "room-access-token"}"#;
        let grant: Grant = serde_json::from_str(json).expect("deserialize");

        assert_eq!(grant.token.expose_secret(), "room-access-token");

        let debug = format!("{grant:?}");
        assert!(debug.contains("stream-7"));
        assert!(!debug.contains("room-access-token"));
    }
}
