//! Auth-session state for the current client user.
//!
//! SYSTEM CONTEXT
//! ==============
//! `SessionStore` is the single source of truth for "who is logged in". It is
//! shared as `Arc<SessionStore>` between the gateway (which reads the token
//! and invalidates it on 401) and the auth controller (which writes it).
//! Nothing else writes the `authToken` storage key.
//!
//! GENERATIONS
//! ===========
//! Every token change (write or clear) bumps a monotonically increasing
//! generation, so a generation names exactly one token. Flows that span
//! network calls capture the generation up front and write through the
//! `*_at` methods; a completion from an older generation is discarded
//! instead of overwriting a newer login or resurrecting a logged-out session.

pub mod storage;

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StorageError;
use crate::net::api;
use crate::net::gateway::Gateway;
use crate::net::types::User;
use storage::{AUTH_TOKEN_KEY, TokenStorage};

/// Point-in-time copy of the session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
    /// True until the first `restore` finishes.
    pub loading: bool,
}

impl Session {
    /// Derived from the token alone; `user` may lag briefly behind.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[derive(Debug)]
struct Inner {
    token: Option<String>,
    user: Option<User>,
    loading: bool,
    generation: u64,
}

pub struct SessionStore {
    storage: Box<dyn TokenStorage>,
    inner: Mutex<Inner>,
}

impl SessionStore {
    /// Empty, still-loading session over the given durable storage.
    pub fn new(storage: impl TokenStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            inner: Mutex::new(Inner { token: None, user: None, loading: true, generation: 0 }),
        }
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> Session {
        let state = self.state();
        Session { token: state.token.clone(), user: state.user.clone(), loading: state.loading }
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state().token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state()
            .token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Token currently in durable storage. Read failures count as absent.
    #[must_use]
    pub fn persisted_token(&self) -> Option<String> {
        match self.storage.get(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted token");
                None
            }
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Persist `token` and replace the in-memory token and user.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the token cannot be persisted; memory is
    /// left unchanged in that case.
    pub fn set_session(&self, token: &str, user: Option<User>) -> Result<(), StorageError> {
        let mut state = self.state();
        self.storage.set(AUTH_TOKEN_KEY, token)?;
        state.generation = state.generation.wrapping_add(1);
        state.token = Some(token.to_owned());
        state.user = user;
        Ok(())
    }

    /// Persist `token` if the session has not changed since `generation` was
    /// observed.
    ///
    /// Returns the generation that now identifies `token`, or `None` when the
    /// write was discarded as stale.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the token cannot be persisted.
    pub fn set_token_at(&self, generation: u64, token: &str) -> Result<Option<u64>, StorageError> {
        let mut state = self.state();
        if state.generation != generation {
            return Ok(None);
        }
        self.storage.set(AUTH_TOKEN_KEY, token)?;
        state.generation = state.generation.wrapping_add(1);
        state.token = Some(token.to_owned());
        state.user = None;
        Ok(Some(state.generation))
    }

    /// Attach the fetched user if the token is still the one written at
    /// `generation`.
    pub fn set_user_at(&self, generation: u64, user: User) -> bool {
        let mut state = self.state();
        if state.generation != generation || state.token.is_none() {
            return false;
        }
        state.user = Some(user);
        true
    }

    /// Remove the persisted token and reset memory. Idempotent.
    ///
    /// Memory is reset and the generation bumped even if storage fails.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the persisted token cannot be removed.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.state();
        state.generation = state.generation.wrapping_add(1);
        state.token = None;
        state.user = None;
        self.storage.remove(AUTH_TOKEN_KEY)
    }

    /// Clear only if the token has not changed since `generation` was observed.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the persisted token cannot be removed.
    pub fn clear_at(&self, generation: u64) -> Result<bool, StorageError> {
        let mut state = self.state();
        if state.generation != generation {
            return Ok(false);
        }
        state.generation = state.generation.wrapping_add(1);
        state.token = None;
        state.user = None;
        self.storage.remove(AUTH_TOKEN_KEY)?;
        Ok(true)
    }

    /// Forced logout after the backend rejected `rejected` with 401.
    ///
    /// Only the current token is invalidated: a rejection of any other token
    /// (the session moved on while the request was in flight, or the token
    /// was never adopted) leaves the session alone.
    pub fn invalidate(&self, rejected: Option<&str>) {
        let generation = {
            let state = self.state();
            let Some(current) = state.token.as_deref() else {
                tracing::debug!("401 without a current session; nothing to invalidate");
                return;
            };
            if rejected.is_some_and(|rejected| rejected != current) {
                tracing::debug!("ignoring 401 for a token that is not current");
                return;
            }
            state.generation
        };
        match self.clear_at(generation) {
            Ok(true) => tracing::warn!("backend rejected bearer token; session invalidated"),
            Ok(false) => tracing::debug!("session changed before 401 was handled"),
            Err(e) => tracing::warn!(error = %e, "failed to remove persisted token"),
        }
    }

    fn finish_loading(&self) {
        self.state().loading = false;
    }

    // =========================================================================
    // BOOTSTRAP
    // =========================================================================

    /// Hydrate from durable storage, verifying the token with `GET /auth/me`.
    ///
    /// Always ends with `loading == false`, whatever the outcome.
    pub async fn restore(&self, gateway: &Gateway) -> Session {
        match self.persisted_token() {
            None => tracing::debug!("no persisted token; starting logged out"),
            Some(token) => {
                let generation = self.generation();
                match api::fetch_current_user_with(gateway, &token).await {
                    Ok(user) => {
                        self.adopt_at(generation, token, user);
                    }
                    Err(e) => {
                        tracing::info!(kind = ?e.kind(), error = %e, "persisted token rejected; clearing");
                        match self.clear_at(generation) {
                            Ok(true) => {}
                            Ok(false) => tracing::debug!("session changed during restore; keeping newer state"),
                            Err(e) => tracing::warn!(error = %e, "failed to remove persisted token"),
                        }
                    }
                }
            }
        }
        self.finish_loading();
        self.snapshot()
    }

    /// Adopt a verified persisted token unless the session moved on meanwhile.
    fn adopt_at(&self, generation: u64, token: String, user: User) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!("session changed during restore; keeping newer state");
            return false;
        }
        tracing::info!(user_id = user.id, "session restored");
        state.generation = state.generation.wrapping_add(1);
        state.token = Some(token);
        state.user = Some(user);
        true
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SessionStore")
            .field("authenticated", &state.token.is_some())
            .field("loading", &state.loading)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
