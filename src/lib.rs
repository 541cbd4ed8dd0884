//! Client for the invoice-management backend.
//!
//! ARCHITECTURE
//! ============
//! - `session`: the process-wide [`SessionStore`] (token + user + loading),
//!   backed by durable key/value storage under the `authToken` key.
//! - `net`: the authenticated [`Gateway`] and typed endpoint helpers.
//! - `auth`: the [`AuthController`] flows (login, register, logout, restore).
//!
//! Control flow: callers invoke the controller, the controller calls the
//! gateway, gateway responses update the session store, and callers re-read
//! the store.

pub mod auth;
pub mod config;
pub mod error;
pub mod net;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

pub use auth::{AuthController, AuthOutcome};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind, FieldError, StorageError};
pub use net::gateway::{Gateway, RequestOptions};
pub use session::storage::{AUTH_TOKEN_KEY, FileStorage, MemoryStorage, TokenStorage};
pub use session::{Session, SessionStore};

/// Wire a session store, gateway, and controller from a config.
#[must_use]
pub fn connect(config: &ClientConfig) -> AuthController {
    let session = Arc::new(SessionStore::new(FileStorage::new(&config.storage_path)));
    AuthController::new(Gateway::new(&config.api_url, session))
}
