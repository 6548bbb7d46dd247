//! Redis-backed signaling store.
//!
//! # Key Patterns
//!
//! - `stream:{id}:record` - Stream record (JSON string)
//! - `stream:{id}:updates` - Pub/sub channel carrying every new snapshot
//!
//! Mutations run as Lua scripts (see `lua_scripts`) so that the write and
//! its notification are one atomic step. Subscriptions listen on the
//! channel first and then seed from `GET`, so no write between the two is
//! missed.
//!
//! # Connection Pattern
//!
//! Commands share one `MultiplexedConnection`, cloned per call. Each
//! subscription opens its own pub/sub connection, released when the
//! subscription is dropped.

use super::lua_scripts;
use super::{RecordSubscription, SignalingStore, StoreError};
use crate::model::{IceCandidate, RecordPatch, StreamRecord};
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::StreamId;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

fn record_key(stream_id: &StreamId) -> String {
    format!("stream:{stream_id}:record")
}

fn updates_channel(stream_id: &StreamId) -> String {
    format!("stream:{stream_id}:updates")
}

/// Signaling store shared across processes through Redis.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct RedisSignalingStore {
    client: Client,
    connection: MultiplexedConnection,
    create_script: Script,
    patch_script: Script,
    append_script: Script,
    reset_script: Script,
}

impl std::fmt::Debug for RedisSignalingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSignalingStore").finish_non_exhaustive()
    }
}

impl RedisSignalingStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(redis_url: &SecretString) -> Result<Self, StoreError> {
        let client = Client::open(redis_url.expose_secret()).map_err(|e| {
            // The URL may carry a password; log only the error
            error!(
                target: "live.store.redis",
                error = %e,
                "Failed to open Redis client"
            );
            StoreError::Backend(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(
                    target: "live.store.redis",
                    error = %e,
                    "Failed to connect to Redis"
                );
                StoreError::Backend(format!("Failed to connect to Redis: {e}"))
            })?;

        debug!(target: "live.store.redis", "Connected to signaling store");

        Ok(Self {
            client,
            connection,
            create_script: Script::new(lua_scripts::CREATE_RECORD),
            patch_script: Script::new(lua_scripts::PATCH_RECORD),
            append_script: Script::new(lua_scripts::APPEND_CANDIDATE),
            reset_script: Script::new(lua_scripts::RESET_NEGOTIATION),
        })
    }

    /// Run a record script and return its status code.
    async fn run(
        &self,
        script: &Script,
        stream_id: &StreamId,
        arg: Option<String>,
        operation: &'static str,
    ) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        let mut invocation = script.key(record_key(stream_id));
        invocation.key(updates_channel(stream_id));
        if let Some(arg) = arg {
            invocation.arg(arg);
        }

        invocation.invoke_async(&mut conn).await.map_err(|e| {
            warn!(
                target: "live.store.redis",
                error = %e,
                stream_id = %stream_id,
                operation,
                "Signaling store script failed"
            );
            StoreError::Backend(format!("{operation} failed: {e}"))
        })
    }
}

#[async_trait]
impl SignalingStore for RedisSignalingStore {
    #[instrument(skip_all, fields(stream_id = %record.id))]
    async fn create(&self, record: StreamRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(&record)?;
        self.run(&self.create_script, &record.id, Some(json), "create")
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(stream_id = %stream_id))]
    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamRecord>, StoreError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(record_key(stream_id)).await.map_err(|e| {
            warn!(
                target: "live.store.redis",
                error = %e,
                stream_id = %stream_id,
                "Failed to read stream record"
            );
            StoreError::Backend(format!("get failed: {e}"))
        })?;

        raw.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    #[instrument(skip_all, fields(stream_id = %stream_id))]
    async fn update(&self, stream_id: &StreamId, patch: RecordPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(&patch)?;
        match self
            .run(&self.patch_script, stream_id, Some(json), "update")
            .await?
        {
            0 => Err(StoreError::NotFound(stream_id.clone())),
            _ => Ok(()),
        }
    }

    #[instrument(skip_all, fields(stream_id = %stream_id, origin = candidate.origin.as_str()))]
    async fn append_candidate(
        &self,
        stream_id: &StreamId,
        candidate: IceCandidate,
    ) -> Result<bool, StoreError> {
        let json = serde_json::to_string(&candidate)?;
        match self
            .run(&self.append_script, stream_id, Some(json), "append_candidate")
            .await?
        {
            0 => Err(StoreError::NotFound(stream_id.clone())),
            2 => Ok(false),
            _ => Ok(true),
        }
    }

    #[instrument(skip_all, fields(stream_id = %stream_id))]
    async fn reset_negotiation(&self, stream_id: &StreamId) -> Result<(), StoreError> {
        match self
            .run(&self.reset_script, stream_id, None, "reset_negotiation")
            .await?
        {
            0 => Err(StoreError::NotFound(stream_id.clone())),
            _ => Ok(()),
        }
    }

    #[instrument(skip_all, fields(stream_id = %stream_id))]
    async fn subscribe(&self, stream_id: &StreamId) -> Result<RecordSubscription, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            warn!(
                target: "live.store.redis",
                error = %e,
                "Failed to open pub/sub connection"
            );
            StoreError::Backend(format!("subscribe failed: {e}"))
        })?;
        pubsub
            .subscribe(updates_channel(stream_id))
            .await
            .map_err(|e| StoreError::Backend(format!("subscribe failed: {e}")))?;

        let initial = self.get(stream_id).await?;
        let (tx, rx) = watch::channel(initial);
        let cancel = CancellationToken::new();

        let listener_cancel = cancel.clone();
        let stream_id = stream_id.clone();
        tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            loop {
                tokio::select! {
                    () = listener_cancel.cancelled() => break,
                    message = messages.next() => {
                        let Some(message) = message else {
                            warn!(
                                target: "live.store.redis",
                                stream_id = %stream_id,
                                "Update channel closed"
                            );
                            break;
                        };
                        let payload: String = match message.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(target: "live.store.redis", error = %e, "Unreadable update payload");
                                continue;
                            }
                        };
                        match serde_json::from_str::<StreamRecord>(&payload) {
                            Ok(record) => {
                                tx.send_replace(Some(record));
                            }
                            Err(e) => {
                                warn!(
                                    target: "live.store.redis",
                                    stream_id = %stream_id,
                                    error = %e,
                                    "Discarding malformed snapshot"
                                );
                            }
                        }
                    }
                }
            }
            debug!(target: "live.store.redis", stream_id = %stream_id, "Subscription listener stopped");
        });

        Ok(RecordSubscription::new(rx, cancel))
    }
}
