//! Room token exchange.
//!
//! Trades a stream id for a room access token, authenticating with the
//! signed-in user's id token.

use crate::config::Config;
use crate::errors::LiveError;
use common::secret::{ExposeSecret, SecretString};
use common::session::SessionContext;
use common::types::StreamId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Connection timeout for the token endpoint.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Access grant for one managed room.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomGrant {
    pub token: SecretString,
    pub room_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    stream_id: &'a StreamId,
}

/// HTTP client for the room token endpoint.
#[derive(Clone, Debug)]
pub struct RoomTokenClient {
    http: reqwest::Client,
    url: String,
    session: Arc<SessionContext>,
}

impl RoomTokenClient {
    /// # Errors
    ///
    /// `LiveError::Config` if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        session: Arc<SessionContext>,
    ) -> Result<Self, LiveError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LiveError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.into(),
            session,
        })
    }

    /// # Errors
    ///
    /// `LiveError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &Config, session: Arc<SessionContext>) -> Result<Self, LiveError> {
        Self::new(config.room_token_url(), config.http_timeout, session)
    }

    /// Whether a user is signed in to authenticate the exchange.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Exchange `stream_id` for a room grant.
    ///
    /// # Errors
    ///
    /// - `LiveError::Unauthenticated` if nobody is signed in
    /// - `LiveError::TokenExchange` for a non-success status or bad body
    /// - `LiveError::Http` if the request could not be sent
    #[instrument(skip_all, fields(stream_id = %stream_id))]
    pub async fn fetch(&self, stream_id: &StreamId) -> Result<RoomGrant, LiveError> {
        let id_token = self.session.id_token().ok_or(LiveError::Unauthenticated)?;

        debug!(target: "live.managed.token", "Requesting room token");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(id_token.expose_secret())
            .json(&TokenRequest { stream_id })
            .send()
            .await
            .map_err(|e| {
                debug!(target: "live.managed.token", error = %e, "Token request failed");
                LiveError::Http(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(
                target: "live.managed.token",
                status = %status,
                "Room token exchange rejected"
            );
            // Body may echo request details; keep it out of normal logs
            trace!(target: "live.managed.token", body = %body, "Rejection body");
            return Err(LiveError::TokenExchange(format!("Status {status}")));
        }

        let grant: RoomGrant = response.json().await.map_err(|e| {
            warn!(target: "live.managed.token", error = %e, "Malformed token response");
            LiveError::TokenExchange(format!("Invalid response: {e}"))
        })?;

        debug!(
            target: "live.managed.token",
            room_name = %grant.room_name,
            "Room token acquired"
        );
        Ok(grant)
    }
}
