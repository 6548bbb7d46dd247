//! Session state machine shared by every live session.
//!
//! ```text
//! Idle -> AcquiringMedia -> Connecting -> Live -> Ended
//!              |                |
//!              +-----> Error <--+
//! ```
//!
//! `Ended` is reachable from every non-terminal state. `Error` and `Ended`
//! are terminal.

use crate::errors::LiveError;
use crate::observability::metrics;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle state of a live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Idle,
    AcquiringMedia,
    Connecting,
    Live,
    Error,
    Ended,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AcquiringMedia => "acquiring-media",
            SessionState::Connecting => "connecting",
            SessionState::Live => "live",
            SessionState::Error => "error",
            SessionState::Ended => "ended",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Error | SessionState::Ended)
    }

    /// Whether `self -> next` is an edge of the state machine.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{AcquiringMedia, Connecting, Ended, Error, Idle, Live};
        match (self, next) {
            (Error | Ended, _) => false,
            (_, Ended)
            | (Idle, AcquiringMedia | Connecting)
            | (AcquiringMedia, Connecting | Error)
            | (Connecting, Live | Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a stream a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Broadcaster,
    Viewer,
}

impl SessionRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionRole::Broadcaster => "broadcaster",
            SessionRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces the state machine and publishes every change to watchers.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct SessionStateTracker {
    tx: Arc<watch::Sender<SessionState>>,
    role: SessionRole,
}

impl SessionStateTracker {
    #[must_use]
    pub fn new(role: SessionRole) -> Self {
        let (tx, _) = watch::channel(SessionState::Idle);
        Self {
            tx: Arc::new(tx),
            role,
        }
    }

    #[must_use]
    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `next`, or reject the edge.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::InvalidTransition` if `next` is not reachable
    /// from the current state.
    pub fn transition(&self, next: SessionState) -> Result<(), LiveError> {
        let mut from = SessionState::Idle;
        let moved = self.tx.send_if_modified(|state| {
            from = *state;
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });

        if moved {
            self.record_exit(from, next);
            debug!(
                target: "live.state",
                role = %self.role,
                from = %from,
                to = %next,
                "Session state changed"
            );
            Ok(())
        } else {
            warn!(
                target: "live.state",
                role = %self.role,
                from = %from,
                to = %next,
                "Rejected session state transition"
            );
            Err(LiveError::InvalidTransition { from, to: next })
        }
    }

    /// Move to `Error` if the current state allows it. Returns whether the
    /// state changed.
    pub fn fail(&self) -> bool {
        let mut from = SessionState::Idle;
        let moved = self.tx.send_if_modified(|state| {
            from = *state;
            if state.can_transition_to(SessionState::Error) {
                *state = SessionState::Error;
                true
            } else {
                false
            }
        });
        if moved {
            self.record_exit(from, SessionState::Error);
        }
        moved
    }

    /// Move to `Ended` unless already terminal. Returns whether the state
    /// changed.
    pub fn finish(&self) -> bool {
        let mut from = SessionState::Idle;
        let moved = self.tx.send_if_modified(|state| {
            from = *state;
            if state.is_terminal() {
                false
            } else {
                *state = SessionState::Ended;
                true
            }
        });
        if moved {
            self.record_exit(from, SessionState::Ended);
        }
        moved
    }

    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }

    // Sessions count as active from their first transition out of Idle.
    fn record_exit(&self, from: SessionState, to: SessionState) {
        if to.is_terminal() && from != SessionState::Idle {
            metrics::record_session_closed(self.role);
        }
    }
}
