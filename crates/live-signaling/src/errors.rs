//! Live signaling error types.
//!
//! Session failures are terminal: nothing here is retried. Details go to the
//! log; callers surface [`LiveError::client_message`] to users.

use crate::config::ConfigError;
use crate::media::MediaError;
use crate::peer::PeerError;
use crate::state::{SessionRole, SessionState};
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The user refused camera or microphone access.
    #[error("Media permission denied")]
    MediaPermissionDenied,

    /// Capture device failure other than a permission refusal.
    #[error("Media error: {0}")]
    Media(MediaError),

    /// The media engine rejected an operation.
    #[error("Peer connection error: {0}")]
    Peer(#[from] PeerError),

    /// Signaling store read or write failed.
    #[error("Signaling store error: {0}")]
    Store(#[from] StoreError),

    /// No signed-in user for an operation that needs one.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Room token exchange failed.
    #[error("Room token exchange failed: {0}")]
    TokenExchange(String),

    /// The managed room SDK reported a failure.
    #[error("Room error: {0}")]
    Room(String),

    /// Stream API returned a non-success status.
    #[error("Stream API {operation} failed with status {status}")]
    Api { operation: &'static str, status: u16 },

    /// HTTP transport failure (connect, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rejected state machine transition.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// No answer arrived within the configured window.
    #[error("No answer received within {0:?}")]
    AnswerTimeout(Duration),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<MediaError> for LiveError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::PermissionDenied => LiveError::MediaPermissionDenied,
            other => LiveError::Media(other),
        }
    }
}

impl From<ConfigError> for LiveError {
    fn from(err: ConfigError) -> Self {
        LiveError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for LiveError {
    fn from(err: reqwest::Error) -> Self {
        LiveError::Http(err.to_string())
    }
}

impl LiveError {
    /// Client-safe message for the role that failed (no internal details).
    ///
    /// Everything except a missing sign-in, permission denial included,
    /// reads as the role's generic failure.
    #[must_use]
    pub fn client_message(&self, role: SessionRole) -> &'static str {
        match self {
            LiveError::Unauthenticated => "Must be authenticated",
            _ => match role {
                SessionRole::Broadcaster => "Failed to start stream",
                SessionRole::Viewer => "Failed to connect to stream",
            },
        }
    }

    /// Bounded label for the failure metric.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            LiveError::MediaPermissionDenied => "media_denied",
            LiveError::Media(_) => "media",
            LiveError::Peer(_) => "peer",
            LiveError::Store(_) => "store",
            LiveError::Unauthenticated => "unauthenticated",
            LiveError::TokenExchange(_) => "token_exchange",
            LiveError::Room(_) => "room",
            LiveError::Api { .. } => "api",
            LiveError::Http(_) => "http",
            LiveError::InvalidTransition { .. } => "invalid_transition",
            LiveError::AnswerTimeout(_) => "answer_timeout",
            LiveError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_to_dedicated_variant() {
        let err = LiveError::from(MediaError::PermissionDenied);
        assert!(matches!(err, LiveError::MediaPermissionDenied));

        let err = LiveError::from(MediaError::DeviceNotFound("camera".to_string()));
        assert!(matches!(err, LiveError::Media(_)));
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = LiveError::Store(StoreError::Backend(
            "redis://:hunter2@cache:6379 refused".to_string(),
        ));
        assert_eq!(
            err.client_message(SessionRole::Broadcaster),
            "Failed to start stream"
        );
        assert_eq!(
            err.client_message(SessionRole::Viewer),
            "Failed to connect to stream"
        );
    }

    #[test]
    fn test_permission_denial_uses_generic_message() {
        let err = LiveError::MediaPermissionDenied;
        assert_eq!(
            err.client_message(SessionRole::Broadcaster),
            "Failed to start stream"
        );
        assert_eq!(
            err.client_message(SessionRole::Viewer),
            "Failed to connect to stream"
        );
    }

    #[test]
    fn test_unauthenticated_message_is_role_independent() {
        let err = LiveError::Unauthenticated;
        assert_eq!(err.client_message(SessionRole::Viewer), "Must be authenticated");
        assert_eq!(
            err.client_message(SessionRole::Broadcaster),
            "Must be authenticated"
        );
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(LiveError::MediaPermissionDenied.reason(), "media_denied");
        assert_eq!(
            LiveError::Api {
                operation: "start_stream",
                status: 503
            }
            .reason(),
            "api"
        );
        assert_eq!(
            LiveError::AnswerTimeout(Duration::from_secs(5)).reason(),
            "answer_timeout"
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = LiveError::Api {
            operation: "end_stream",
            status: 404,
        };
        assert_eq!(err.to_string(), "Stream API end_stream failed with status 404");
    }
}
