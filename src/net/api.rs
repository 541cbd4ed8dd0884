//! Typed REST helpers for the invoice backend.
//!
//! Thin wrappers over [`Gateway`]: each function names one endpoint and its
//! payload/response types. Callers get `Result` outputs instead of panics so
//! a failed fetch degrades to a visible message.

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::gateway::{Gateway, RequestOptions};
use super::types::{
    Client, ClientUpdate, Invoice, InvoiceQuery, InvoiceUpdate, NewClient, NewInvoice, Page, PasswordGrant,
    Registration, TokenResponse, User,
};
use crate::error::ApiError;

const TOKEN_ENDPOINT: &str = "/auth/token";
const REGISTER_ENDPOINT: &str = "/auth/register";
const ME_ENDPOINT: &str = "/auth/me";
const USERS_ENDPOINT: &str = "/auth/users";

fn invoice_endpoint(id: i64) -> String {
    format!("/invoices/{id}")
}

fn client_endpoint(id: i64) -> String {
    format!("/clients/{id}")
}

fn json_options<T: Serialize>(payload: &T) -> Result<RequestOptions, ApiError> {
    let body = serde_json::to_value(payload).map_err(|e| ApiError::Http {
        status: 0,
        message: format!("failed to encode request body: {e}"),
        detail: None,
    })?;
    Ok(RequestOptions::new().body(body))
}

// =============================================================================
// AUTH
// =============================================================================

/// Exchange credentials for a bearer token via the form-encoded password grant.
///
/// # Errors
///
/// Returns the normalized gateway error; bad credentials arrive as
/// [`ApiError::Http`] with status 401.
pub async fn request_token(gateway: &Gateway, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
    let grant = PasswordGrant { username: email, password, grant_type: "password" };
    gateway.post_form(TOKEN_ENDPOINT, &grant).await
}

/// Create an account. The backend answers with the new user record.
///
/// # Errors
///
/// Returns the normalized gateway error (e.g. "Email already registered").
pub async fn register(gateway: &Gateway, registration: &Registration<'_>) -> Result<User, ApiError> {
    let options = json_options(registration)?;
    gateway
        .request_json(Method::POST, REGISTER_ENDPOINT, options)
        .await
}

/// Fetch the current user with whatever token the session store holds.
///
/// # Errors
///
/// Returns [`ApiError::Unauthenticated`] when no valid token is held.
pub async fn fetch_current_user(gateway: &Gateway) -> Result<User, ApiError> {
    gateway
        .request_json(Method::GET, ME_ENDPOINT, RequestOptions::new())
        .await
}

/// Fetch the current user with an explicit token, bypassing the store.
///
/// # Errors
///
/// Returns [`ApiError::Unauthenticated`] if the backend rejects `token`.
pub async fn fetch_current_user_with(gateway: &Gateway, token: &str) -> Result<User, ApiError> {
    gateway
        .request_json(Method::GET, ME_ENDPOINT, RequestOptions::new().bearer(token))
        .await
}

/// List every registered user (`GET /auth/users`).
///
/// # Errors
///
/// Returns the normalized gateway error.
pub async fn list_users(gateway: &Gateway) -> Result<Vec<User>, ApiError> {
    gateway
        .request_json(Method::GET, USERS_ENDPOINT, RequestOptions::new())
        .await
}

/// Root endpoint banner; useful as a reachability check.
///
/// # Errors
///
/// Returns the normalized gateway error.
pub async fn ping(gateway: &Gateway) -> Result<Value, ApiError> {
    gateway.request(Method::GET, "/", RequestOptions::new()).await
}

// =============================================================================
// INVOICES
// =============================================================================

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn list_invoices(gateway: &Gateway, query: InvoiceQuery) -> Result<Vec<Invoice>, ApiError> {
    let path = format!("/invoices{}", query.to_query_string());
    gateway
        .request_json(Method::GET, &path, RequestOptions::new())
        .await
}

/// # Errors
///
/// Returns the normalized gateway error; a missing invoice is an HTTP 404.
pub async fn get_invoice(gateway: &Gateway, id: i64) -> Result<Invoice, ApiError> {
    gateway
        .request_json(Method::GET, &invoice_endpoint(id), RequestOptions::new())
        .await
}

/// # Errors
///
/// Returns [`ApiError::Validation`] when the backend rejects fields.
pub async fn create_invoice(gateway: &Gateway, invoice: &NewInvoice) -> Result<Invoice, ApiError> {
    let options = json_options(invoice)?;
    gateway
        .request_json(Method::POST, "/invoices", options)
        .await
}

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn update_invoice(gateway: &Gateway, id: i64, update: &InvoiceUpdate) -> Result<Invoice, ApiError> {
    let options = json_options(update)?;
    gateway
        .request_json(Method::PUT, &invoice_endpoint(id), options)
        .await
}

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn delete_invoice(gateway: &Gateway, id: i64) -> Result<(), ApiError> {
    gateway
        .request(Method::DELETE, &invoice_endpoint(id), RequestOptions::new())
        .await
        .map(|_| ())
}

// =============================================================================
// CLIENTS
// =============================================================================

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn list_clients(gateway: &Gateway, page: Page) -> Result<Vec<Client>, ApiError> {
    let path = format!("/clients{}", page.to_query_string());
    gateway
        .request_json(Method::GET, &path, RequestOptions::new())
        .await
}

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn get_client(gateway: &Gateway, id: i64) -> Result<Client, ApiError> {
    gateway
        .request_json(Method::GET, &client_endpoint(id), RequestOptions::new())
        .await
}

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn create_client(gateway: &Gateway, client: &NewClient) -> Result<Client, ApiError> {
    let options = json_options(client)?;
    gateway
        .request_json(Method::POST, "/clients", options)
        .await
}

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn update_client(gateway: &Gateway, id: i64, update: &ClientUpdate) -> Result<Client, ApiError> {
    let options = json_options(update)?;
    gateway
        .request_json(Method::PUT, &client_endpoint(id), options)
        .await
}

/// # Errors
///
/// Returns the normalized gateway error.
pub async fn delete_client(gateway: &Gateway, id: i64) -> Result<(), ApiError> {
    gateway
        .request(Method::DELETE, &client_endpoint(id), RequestOptions::new())
        .await
        .map(|_| ())
}
