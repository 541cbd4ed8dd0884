//! User-facing authentication flows: login, register, logout, bootstrap.
//!
//! Every flow returns an [`AuthOutcome`] instead of an error so callers can
//! render inline feedback. The only shared state is the injected
//! [`SessionStore`]; network steps within one flow run strictly in sequence.

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

use std::sync::Arc;

use serde::Serialize;

use crate::error::ApiError;
use crate::net::api;
use crate::net::gateway::Gateway;
use crate::net::types::Registration;
use crate::session::{Session, SessionStore};

const LOGIN_FAILED: &str = "Login failed";
const USER_FETCH_FAILED: &str = "Failed to fetch user info";
const LOGIN_SUPERSEDED: &str = "Login superseded by a newer session change";

/// Result of an auth flow, serialized as `{"success": true}` or
/// `{"success": false, "error": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "OutcomeWire")]
pub enum AuthOutcome {
    Success,
    Failure { error: String },
}

impl AuthOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self::Failure { error: error.into() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { error } => Some(error),
        }
    }
}

#[derive(Serialize)]
struct OutcomeWire {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<AuthOutcome> for OutcomeWire {
    fn from(outcome: AuthOutcome) -> Self {
        match outcome {
            AuthOutcome::Success => Self { success: true, error: None },
            AuthOutcome::Failure { error } => Self { success: false, error: Some(error) },
        }
    }
}

/// Message for a failed password grant: the backend's `detail` if any.
fn login_error_message(error: &ApiError) -> String {
    match error {
        ApiError::Http { detail: Some(serde_json::Value::String(detail)), .. } if !detail.is_empty() => detail.clone(),
        ApiError::Validation { .. } | ApiError::Network(_) => error.to_string(),
        _ => LOGIN_FAILED.to_owned(),
    }
}

/// Orchestrates auth flows over a shared session store and gateway.
#[derive(Clone, Debug)]
pub struct AuthController {
    session: Arc<SessionStore>,
    gateway: Gateway,
}

impl AuthController {
    /// Build a controller using the gateway's session store.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        let session = Arc::clone(gateway.session());
        Self { session, gateway }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Startup check: adopt the persisted token if the backend still accepts it.
    pub async fn restore(&self) -> Session {
        self.session.restore(&self.gateway).await
    }

    /// Password-grant login followed by a user fetch with the fresh token.
    ///
    /// On any failure no token is left behind. Any session change that lands
    /// while this is in flight (a logout, another login, a restore) wins: the
    /// late completion is discarded.
    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        let observed = self.session.generation();

        let grant = match api::request_token(&self.gateway, email, password).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::info!(kind = ?e.kind(), "login rejected");
                return AuthOutcome::failure(login_error_message(&e));
            }
        };
        let token = grant.access_token;

        let generation = match self.session.set_token_at(observed, &token) {
            Ok(Some(generation)) => generation,
            Ok(None) => return AuthOutcome::failure(LOGIN_SUPERSEDED),
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist token");
                return AuthOutcome::failure(e.to_string());
            }
        };

        // The fresh token is passed directly rather than re-read from storage.
        let user = match api::fetch_current_user_with(&self.gateway, &token).await {
            Ok(user) => user,
            Err(e) => {
                tracing::info!(kind = ?e.kind(), error = %e, "user fetch after login failed");
                self.rollback(generation);
                return AuthOutcome::failure(USER_FETCH_FAILED);
            }
        };

        let user_id = user.id;
        if !self.session.set_user_at(generation, user) {
            return AuthOutcome::failure(LOGIN_SUPERSEDED);
        }
        tracing::info!(user_id, "logged in");
        AuthOutcome::Success
    }

    /// Create the account, then log in with the same credentials.
    pub async fn register(&self, email: &str, password: &str, full_name: Option<&str>) -> AuthOutcome {
        let registration = Registration { email, password, full_name };
        match api::register(&self.gateway, &registration).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "registered");
                self.login(email, password).await
            }
            Err(e) => {
                tracing::info!(kind = ?e.kind(), "registration rejected");
                AuthOutcome::failure(e.to_string())
            }
        }
    }

    /// Clear the local session. No backend call; safe to repeat.
    pub fn logout(&self) {
        if let Err(e) = self.session.clear() {
            tracing::warn!(error = %e, "failed to remove persisted token");
        }
        tracing::info!("logged out");
    }

    /// Undo a token written by this login if nothing else changed the session.
    fn rollback(&self, generation: u64) {
        if let Err(e) = self.session.clear_at(generation) {
            tracing::warn!(error = %e, "failed to remove persisted token");
        }
    }
}
