//! Backend record shapes for the `/auth`, `/invoices`, and `/clients` APIs.
//!
//! DESIGN
//! ======
//! Records returned by the backend are read-only on this side. Create
//! payloads carry the client-side form checks (`validate`) so obviously bad
//! input never costs a round trip; the backend remains the authority and its
//! `detail` list still reaches callers through `ApiError::Validation`.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

const INVOICE_NUMBER_MAX: usize = 100;
const CUSTOMER_NAME_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 1000;

// =============================================================================
// AUTH
// =============================================================================

/// The authenticated user as returned by `GET /auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Any further fields the backend adds are kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Body of a successful `POST /auth/token` grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Form fields of the OAuth2 password grant.
#[derive(Serialize)]
pub(crate) struct PasswordGrant<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub grant_type: &'static str,
}

/// JSON body for `POST /auth/register`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
}

// =============================================================================
// INVOICES
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            other => Err(format!("Status must be one of: draft, sent, paid, overdue (got '{other}')")),
        }
    }
}

/// An invoice owned by the current user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub amount: BigDecimal,
    pub status: InvoiceStatus,
    pub description: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for `POST /invoices`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub amount: BigDecimal,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub description: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl NewInvoice {
    /// Trim text fields and turn blank optionals into `None`, as the invoice form does.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.invoice_number = self.invoice_number.trim().to_owned();
        self.customer_name = self.customer_name.trim().to_owned();
        self.customer_email = blank_to_none(self.customer_email);
        self.description = blank_to_none(self.description);
        self
    }

    /// Client-side form checks.
    ///
    /// # Errors
    ///
    /// Returns every failing field; an empty list is never returned as `Err`.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_required(&mut errors, "invoice_number", &self.invoice_number, INVOICE_NUMBER_MAX);
        check_required(&mut errors, "customer_name", &self.customer_name, CUSTOMER_NAME_MAX);
        check_email(&mut errors, "customer_email", self.customer_email.as_deref());
        if self.amount <= BigDecimal::zero() {
            errors.push(FieldError::new("amount", "Amount must be a positive number"));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX {
                errors.push(FieldError::new("description", format!("must be at most {DESCRIPTION_MAX} characters")));
            }
        }
        if self.due_date < self.issue_date {
            errors.push(FieldError::new("due_date", "Due date cannot be before the issue date"));
        }
        into_result(errors)
    }
}

/// Partial update for `PUT /invoices/{id}`. Unset fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl InvoiceUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Filters for `GET /invoices`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl InvoiceQuery {
    pub(crate) fn to_query_string(self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status={status}"));
        }
        if let Some(skip) = self.skip {
            parts.push(format!("skip={skip}"));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={limit}"));
        }
        if parts.is_empty() { String::new() } else { format!("?{}", parts.join("&")) }
    }
}

// =============================================================================
// CLIENTS
// =============================================================================

/// A billing contact owned by the current user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for `POST /clients`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
}

impl NewClient {
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_owned();
        self.email = blank_to_none(self.email);
        self.phone = blank_to_none(self.phone);
        self.company = blank_to_none(self.company);
        self.address = blank_to_none(self.address);
        self
    }

    /// Client-side form checks.
    ///
    /// # Errors
    ///
    /// Returns every failing field.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Client name is required"));
        }
        check_email(&mut errors, "email", self.email.as_deref());
        into_result(errors)
    }
}

/// Partial update for `PUT /clients/{id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ClientUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Paging for `GET /clients`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl Page {
    pub(crate) fn to_query_string(self) -> String {
        InvoiceQuery { status: None, skip: self.skip, limit: self.limit }.to_query_string()
    }
}

// =============================================================================
// FORM HELPERS
// =============================================================================

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn check_required(errors: &mut Vec<FieldError>, field: &str, value: &str, max: usize) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(FieldError::new(field, "This field is required"));
    } else if len > max {
        errors.push(FieldError::new(field, format!("must be at most {max} characters")));
    }
}

fn check_email(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>) {
    if let Some(email) = value.map(str::trim).filter(|v| !v.is_empty()) {
        if !looks_like_email(email) {
            errors.push(FieldError::new(field, "Please enter a valid email address"));
        }
    }
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub(crate) fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn into_result(errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
