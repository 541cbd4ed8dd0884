//! Networking modules for the invoice backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! `gateway` performs authenticated HTTP calls, `api` names the endpoints,
//! and `types` defines the wire schema.

pub mod api;
pub mod gateway;
pub mod types;
