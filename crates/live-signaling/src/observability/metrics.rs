//! Metrics for live sessions.
//!
//! All metrics use the `live_` prefix and the `_total` suffix for counters.
//! The library records through the `metrics` facade only; the host
//! application installs an exporter if it wants one.
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `role`: broadcaster, viewer
//! - `backend`: custom, managed
//! - `reason`: bounded by `LiveError::reason` (~12 values)
//! - `origin`: broadcaster, viewer

use crate::config::BackendKind;
use crate::model::CandidateOrigin;
use crate::state::SessionRole;
use metrics::{counter, gauge};

/// Record a session start.
///
/// Metric: `live_sessions_started_total`
/// Labels: `role`, `backend`
pub fn record_session_started(role: SessionRole, backend: BackendKind) {
    counter!(
        "live_sessions_started_total",
        "role" => role.as_str(),
        "backend" => backend.as_str()
    )
    .increment(1);
    gauge!("live_sessions_active", "role" => role.as_str()).increment(1.0);
}

/// Record a session leaving the active set (ended or failed).
///
/// Metric: `live_sessions_active`
/// Labels: `role`
pub fn record_session_closed(role: SessionRole) {
    gauge!("live_sessions_active", "role" => role.as_str()).decrement(1.0);
}

/// Record a terminal session failure.
///
/// Metric: `live_session_failures_total`
/// Labels: `role`, `reason`
pub fn record_session_failure(role: SessionRole, reason: &'static str) {
    counter!(
        "live_session_failures_total",
        "role" => role.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Record a local candidate written to the signaling store.
///
/// Metric: `live_candidates_appended_total`
/// Labels: `origin`
pub fn record_candidate_appended(origin: CandidateOrigin) {
    counter!("live_candidates_appended_total", "origin" => origin.as_str()).increment(1);
}

/// Metric: `live_candidates_applied_total`
/// Labels: `origin` (the applying peer)
pub fn record_candidates_applied(origin: CandidateOrigin, count: usize) {
    counter!("live_candidates_applied_total", "origin" => origin.as_str()).increment(count as u64);
}

/// Candidates seen before a remote description existed.
///
/// Metric: `live_candidates_dropped_total`
/// Labels: `origin` (the peer that skipped them)
pub fn record_candidates_dropped(origin: CandidateOrigin, count: usize) {
    counter!("live_candidates_dropped_total", "origin" => origin.as_str()).increment(count as u64);
}

/// Metric: `live_room_participants`
/// Labels: none
pub fn set_room_participants(count: usize) {
    // usize to f64 is exact for realistic room sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("live_room_participants").set(count as f64);
}
