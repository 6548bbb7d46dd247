//! Snapshot handling shared by the broadcaster and viewer flows.

use crate::model::{CandidateOrigin, IceCandidate, SessionDescription, StreamRecord};
use crate::observability::metrics;
use crate::peer::{PeerConnection, PeerError};
use std::collections::HashSet;
use tracing::debug;

/// Apply `desc` as the remote description unless one is already set.
///
/// Returns `true` if it was applied. A second call is a no-op.
///
/// # Errors
///
/// Propagates the engine's rejection of the description.
pub async fn apply_remote_description_once(
    peer: &dyn PeerConnection,
    desc: &SessionDescription,
) -> Result<bool, PeerError> {
    if peer.remote_description().await.is_some() {
        return Ok(false);
    }
    peer.set_remote_description(desc.clone()).await?;
    Ok(true)
}

/// Candidates already handed to the peer connection in this session.
#[derive(Debug, Default)]
pub struct CandidateLedger {
    applied: HashSet<IceCandidate>,
    dropped: u64,
}

impl CandidateLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied.len()
    }

    /// Candidates skipped because no remote description existed yet.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Apply the other side's candidates from `record` that this peer has not
/// applied yet.
///
/// `local` is the origin of this peer; its own candidates are skipped.
/// Without a remote description nothing is applied and nothing is kept:
/// the candidates stay in the record and are picked up from a later
/// snapshot.
///
/// # Errors
///
/// Propagates the engine's rejection of a candidate.
pub async fn apply_remote_candidates(
    peer: &dyn PeerConnection,
    record: &StreamRecord,
    local: CandidateOrigin,
    ledger: &mut CandidateLedger,
) -> Result<usize, PeerError> {
    let remote = local.remote();
    let pending: Vec<&IceCandidate> = record
        .candidates_from(remote)
        .filter(|c| !ledger.applied.contains(*c))
        .collect();

    if pending.is_empty() {
        return Ok(0);
    }

    if peer.remote_description().await.is_none() {
        ledger.dropped += pending.len() as u64;
        metrics::record_candidates_dropped(local, pending.len());
        debug!(
            target: "live.negotiation",
            origin = remote.as_str(),
            count = pending.len(),
            "Candidates seen before remote description, not applied"
        );
        return Ok(0);
    }

    let mut applied = 0;
    for candidate in pending {
        peer.add_ice_candidate(candidate.clone()).await?;
        ledger.applied.insert(candidate.clone());
        applied += 1;
    }
    metrics::record_candidates_applied(local, applied);
    Ok(applied)
}
