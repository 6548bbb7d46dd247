//! Stream janitor
//!
//! Clears stale offer/answer/candidate state from stream records in the
//! shared Redis signaling store, so the next broadcast on those streams
//! starts a clean negotiation.
//!
//! Usage: `stream-janitor <stream-id>...`

use common::types::StreamId;
use live_signaling::observability::init_tracing;
use live_signaling::store::{RedisSignalingStore, SignalingStore};
use live_signaling::Config;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_tracing(&config.observability)?;

    let ids: Vec<StreamId> = std::env::args().skip(1).map(StreamId::from).collect();
    if ids.is_empty() {
        warn!(target: "live.janitor", "No stream ids given; usage: stream-janitor <stream-id>...");
        return Ok(ExitCode::from(2));
    }

    let redis_url = config.require_redis_url().map_err(|e| {
        error!(target: "live.janitor", error = %e, "Janitor needs a signaling store");
        e
    })?;
    let store = RedisSignalingStore::connect(redis_url).await.map_err(|e| {
        error!(target: "live.janitor", error = %e, "Failed to connect to signaling store");
        e
    })?;

    info!(target: "live.janitor", streams = ids.len(), "Resetting negotiation state");

    let mut failed = 0usize;
    for id in &ids {
        match store.reset_negotiation(id).await {
            Ok(()) => info!(target: "live.janitor", stream_id = %id, "Negotiation reset"),
            Err(e) => {
                failed += 1;
                error!(target: "live.janitor", stream_id = %id, error = %e, "Reset failed");
            }
        }
    }

    if failed > 0 {
        warn!(
            target: "live.janitor",
            failed,
            total = ids.len(),
            "Some streams could not be reset"
        );
        return Ok(ExitCode::FAILURE);
    }

    info!(target: "live.janitor", "Done");
    Ok(ExitCode::SUCCESS)
}
