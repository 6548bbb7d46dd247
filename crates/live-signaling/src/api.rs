//! Stream lifecycle REST client.
//!
//! Creates, starts, ends and reconfigures streams on the application API,
//! and reads per-stream analytics.

use crate::config::Config;
use crate::errors::LiveError;
use chrono::{DateTime, Utc};
use common::types::{StreamId, UserId};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A stream as stored by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: StreamId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub is_live: bool,
    pub viewer_count: u64,
    pub chat_enabled: bool,
    pub recording_enabled: bool,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Body of `create_stream`. Unset fields take server defaults.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStream {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_enabled: Option<bool>,
}

impl NewStream {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update for `update_settings`. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamAnalytics {
    pub peak_viewers: u64,
    pub average_viewers: f64,
    pub total_views: u64,
    pub chat_messages: u64,
    /// Seconds.
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// HTTP client for `{api}/streams`.
#[derive(Clone, Debug)]
pub struct StreamApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl StreamApiClient {
    /// # Errors
    ///
    /// `LiveError::Config` if `base_url` is not a usable base URL or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LiveError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LiveError::Config(format!("Invalid stream API URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LiveError::Config(format!(
                "Stream API URL cannot carry a path: {base_url}"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LiveError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url })
    }

    /// # Errors
    ///
    /// `LiveError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, LiveError> {
        Self::new(&config.api_url, config.http_timeout)
    }

    /// `segments` are percent-encoded, so a stream id never changes the route.
    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        self.http.request(method, url)
    }

    /// # Errors
    ///
    /// `LiveError::Api` on a non-success status, `LiveError::Http` on
    /// transport or decode failure.
    #[instrument(skip_all, fields(title = %stream.title))]
    pub async fn create_stream(&self, stream: &NewStream) -> Result<Stream, LiveError> {
        let response = send(
            "create_stream",
            self.request(Method::POST, &["streams"]).json(stream),
        )
        .await?;
        decode(response).await
    }

    /// # Errors
    ///
    /// See [`Self::create_stream`].
    #[instrument(skip_all, fields(stream_id = %id))]
    pub async fn start_stream(&self, id: &StreamId) -> Result<Stream, LiveError> {
        let response = send(
            "start_stream",
            self.request(Method::POST, &["streams", id.as_str(), "start"]),
        )
        .await?;
        decode(response).await
    }

    /// # Errors
    ///
    /// See [`Self::create_stream`].
    #[instrument(skip_all, fields(stream_id = %id))]
    pub async fn end_stream(&self, id: &StreamId) -> Result<(), LiveError> {
        send(
            "end_stream",
            self.request(Method::POST, &["streams", id.as_str(), "end"]),
        )
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`Self::create_stream`].
    #[instrument(skip_all, fields(stream_id = %id))]
    pub async fn get_analytics(&self, id: &StreamId) -> Result<StreamAnalytics, LiveError> {
        let response = send(
            "get_analytics",
            self.request(Method::GET, &["streams", id.as_str(), "analytics"]),
        )
        .await?;
        decode(response).await
    }

    /// # Errors
    ///
    /// See [`Self::create_stream`].
    #[instrument(skip_all, fields(stream_id = %id))]
    pub async fn update_settings(
        &self,
        id: &StreamId,
        settings: &StreamSettings,
    ) -> Result<Stream, LiveError> {
        let response = send(
            "update_settings",
            self.request(Method::PATCH, &["streams", id.as_str()])
                .json(settings),
        )
        .await?;
        decode(response).await
    }
}

async fn send(operation: &'static str, request: RequestBuilder) -> Result<Response, LiveError> {
    let response = request.send().await.map_err(|e| {
        debug!(target: "live.api", operation, error = %e, "Stream API request failed");
        LiveError::Http(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        warn!(target: "live.api", operation, status = %status, "Stream API rejected request");
        return Err(LiveError::Api {
            operation,
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LiveError> {
    response.json().await.map_err(|e| {
        warn!(target: "live.api", error = %e, "Malformed stream API response");
        LiveError::Http(format!("Invalid response: {e}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stream_json(is_live: bool) -> serde_json::Value {
        serde_json::json!({
            "id": "stream-1",
            "title": "Morning set",
            "scheduledFor": "2026-03-01T09:00:00Z",
            "isLive": is_live,
            "viewerCount": 0,
            "chatEnabled": true,
            "recordingEnabled": false,
            "userId": "user-1",
            "createdAt": "2026-02-28T12:00:00Z"
        })
    }

    fn client(server: &MockServer) -> StreamApiClient {
        StreamApiClient::new(&format!("{}/", server.uri()), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_create_stream_sends_only_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/streams"))
            .and(body_json(serde_json::json!({
                "title": "Morning set",
                "chatEnabled": true
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(stream_json(false)))
            .expect(1)
            .mount(&server)
            .await;

        let new = NewStream {
            chat_enabled: Some(true),
            ..NewStream::titled("Morning set")
        };
        let stream = client(&server).create_stream(&new).await.unwrap();

        assert_eq!(stream.id, StreamId::from("stream-1"));
        assert!(!stream.is_live);
        assert!(stream.description.is_none());
        assert!(stream.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_start_stream_returns_live_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/streams/stream-1/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stream_json(true)))
            .mount(&server)
            .await;

        let stream = client(&server)
            .start_stream(&StreamId::from("stream-1"))
            .await
            .unwrap();
        assert!(stream.is_live);
    }

    #[tokio::test]
    async fn test_end_stream_ignores_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/streams/stream-1/end"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .end_stream(&StreamId::from("stream-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_success_is_api_error_with_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/streams/missing/end"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .end_stream(&StreamId::from("missing"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LiveError::Api {
                operation: "end_stream",
                status: 404
            }
        ));
    }

    #[tokio::test]
    async fn test_get_analytics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streams/stream-1/analytics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "peakViewers": 120,
                "averageViewers": 64.5,
                "totalViews": 300,
                "chatMessages": 42,
                "duration": 3600,
                "startTime": "2026-03-01T09:00:00Z",
                "endTime": "2026-03-01T10:00:00Z"
            })))
            .mount(&server)
            .await;

        let analytics = client(&server)
            .get_analytics(&StreamId::from("stream-1"))
            .await
            .unwrap();

        assert_eq!(analytics.peak_viewers, 120);
        assert_eq!(analytics.duration, 3600);
        assert!(analytics.end_time.is_some());
    }

    #[tokio::test]
    async fn test_update_settings_patches_partial_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/streams/stream-1"))
            .and(body_json(serde_json::json!({ "chatEnabled": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(stream_json(true)))
            .expect(1)
            .mount(&server)
            .await;

        let settings = StreamSettings {
            chat_enabled: Some(false),
            ..StreamSettings::default()
        };
        client(&server)
            .update_settings(&StreamId::from("stream-1"), &settings)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_body_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/streams/stream-1/start"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server)
            .start_stream(&StreamId::from("stream-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::Http(_)));
    }

    #[tokio::test]
    async fn test_stream_id_is_a_single_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/streams/a%2Fb%20c%3Fx/end"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .end_stream(&StreamId::from("a/b c?x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_base_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/streams/stream-1/end"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            StreamApiClient::new(&format!("{}/api/v1", server.uri()), Duration::from_secs(2))
                .unwrap();
        client.end_stream(&StreamId::from("stream-1")).await.unwrap();
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = StreamApiClient::new("not a url", Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, LiveError::Config(_)));
    }
}
