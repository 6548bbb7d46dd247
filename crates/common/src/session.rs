//! Injected user session context.
//!
//! A `SessionContext` is constructed once at application start and handed to
//! every component that needs to know who is signed in. It replaces a
//! module-level auth store: there is no global, and its lifecycle is
//! explicit.
//!
//! # Lifecycle
//!
//! 1. `SessionContext::new()` at start-up (signed out).
//! 2. `sign_in()` when the identity provider reports a user.
//! 3. Components spawn work under `child_token()`.
//! 4. `sign_out()` cancels every child token (tearing down live sessions),
//!    clears the user, and installs a fresh token for the next sign-in.
//!
//! Observers follow auth changes through `subscribe()`.

use crate::secret::SecretString;
use crate::types::UserId;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// An authenticated user as reported by the identity provider.
#[derive(Clone, Debug)]
pub struct UserSession {
    /// Provider-issued user id.
    pub user_id: UserId,
    /// Display name, if the provider has one.
    pub display_name: Option<String>,
    /// Bearer token presented to backend APIs.
    pub id_token: SecretString,
}

impl UserSession {
    #[must_use]
    pub fn new(user_id: UserId, id_token: SecretString) -> Self {
        Self {
            user_id,
            display_name: None,
            id_token,
        }
    }
}

/// Authentication state observed by the UI and the live backends.
#[derive(Clone, Debug, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn(UserSession),
}

impl AuthState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserSession> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            AuthState::SignedOut => None,
        }
    }
}

/// Explicitly constructed session context.
#[derive(Debug)]
pub struct SessionContext {
    state: watch::Sender<AuthState>,
    lifetime: Mutex<CancellationToken>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Create a signed-out context.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::SignedOut);
        Self {
            state,
            lifetime: Mutex::new(CancellationToken::new()),
        }
    }

    /// Record a signed-in user. Replaces any previous user without tearing
    /// down running sessions (the provider refreshed the token).
    pub fn sign_in(&self, user: UserSession) {
        info!(
            target: "common.session",
            user_id = %user.user_id,
            "User signed in"
        );
        self.state.send_replace(AuthState::SignedIn(user));
    }

    /// Sign out: cancel everything spawned under this session and clear the
    /// user. Returns `true` if a user was signed in.
    pub fn sign_out(&self) -> bool {
        let previous = {
            let mut lifetime = self.lifetime.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *lifetime, CancellationToken::new())
        };
        previous.cancel();

        let was_signed_in = self
            .state
            .send_replace(AuthState::SignedOut)
            .is_authenticated();

        if was_signed_in {
            info!(target: "common.session", "User signed out, session work cancelled");
        } else {
            debug!(target: "common.session", "Sign-out requested while signed out");
        }
        was_signed_in
    }

    /// Current auth state snapshot.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserSession> {
        self.state.borrow().user().cloned()
    }

    /// Bearer token of the signed-in user, if any.
    #[must_use]
    pub fn id_token(&self) -> Option<SecretString> {
        self.state.borrow().user().map(|user| user.id_token.clone())
    }

    /// Watch auth changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Token cancelled at the next sign-out.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.lifetime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }
}
