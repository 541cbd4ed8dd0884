//! Normalized error types for backend calls and durable storage.
//!
//! DESIGN
//! ======
//! Every failure the gateway can observe collapses into one [`ApiError`]
//! variant so callers render a single message (or a per-field list) without
//! inspecting transport details. Nothing here is fatal to the process.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of an [`ApiError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing, expired, or rejected bearer token.
    Unauthenticated,
    /// Backend rejected the payload with a structured field list.
    Validation,
    /// Non-2xx response without structured detail.
    Http,
    /// The request never reached the server.
    Network,
}

/// One segment of a validation error location (`["body", "amount"]`, `["body", 0]`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocSegment {
    Key(String),
    Index(u64),
}

impl fmt::Display for LocSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path to the offending value, outermost first.
    #[serde(default)]
    pub loc: Vec<LocSegment>,
    /// Human-readable reason.
    pub msg: String,
}

impl FieldError {
    /// Build a field error for a single top-level field.
    #[must_use]
    pub fn new(field: &str, msg: impl Into<String>) -> Self {
        Self { loc: vec![LocSegment::Key(field.to_owned())], msg: msg.into() }
    }

    /// Name of the offending field: the last `loc` segment, or `"field"`.
    #[must_use]
    pub fn field(&self) -> String {
        self.loc
            .last()
            .map_or_else(|| "field".to_owned(), ToString::to_string)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field(), self.msg)
    }
}

/// Join field errors the way forms show them: `"amount: must be > 0, due_date: required"`.
#[must_use]
pub fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error returned by every gateway call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// HTTP 401. The stored session has already been invalidated.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Non-2xx response whose `detail` was a list of `{loc, msg}` entries.
    #[error("{}", describe_field_errors(.errors))]
    Validation { status: u16, errors: Vec<FieldError> },

    /// Any other non-2xx response, or a 2xx body that was not JSON.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        /// Raw `detail` payload when the body carried one.
        detail: Option<serde_json::Value>,
    },

    /// Transport failure before any response arrived.
    #[error("Network error: unable to reach the server ({0})")]
    Network(String),
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Http { .. } => ErrorKind::Http,
            Self::Network(_) => ErrorKind::Network,
        }
    }

    /// HTTP status carried by the error, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthenticated => Some(401),
            Self::Validation { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Network(_) => None,
        }
    }

    /// Field-level errors for validation failures; empty otherwise.
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Failure reading or writing durable client storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage file {path} is not a JSON object: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage lock poisoned")]
    Poisoned,
}
