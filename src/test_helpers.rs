//! In-process mock of the invoice backend for flow tests.
//!
//! Implements the `/auth`, `/invoices`, and `/clients` contract on an
//! ephemeral port with Axum. Every request is recorded so tests can assert
//! on headers the gateway sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::auth::AuthController;
use crate::net::gateway::Gateway;
use crate::session::SessionStore;
use crate::session::storage::TokenStorage;

const CREATED_AT: &str = "2024-01-01T00:00:00Z";

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub custom: Option<String>,
}

#[derive(Clone, Debug)]
struct MockUser {
    id: i64,
    email: String,
    password: String,
    full_name: Option<String>,
}

impl MockUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.email,
            "full_name": self.full_name,
            "is_active": true,
            "created_at": CREATED_AT,
        })
    }
}

/// Pauses the next request to one endpoint until released, to interleave flows.
#[derive(Default)]
pub(crate) struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    /// Wait on a one-shot gate slot, if armed. Later requests pass freely.
    async fn pass(slot: &Mutex<Option<Arc<Gate>>>) {
        let gate = slot.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[derive(Default)]
pub(crate) struct MockState {
    users: Mutex<Vec<MockUser>>,
    tokens: Mutex<HashMap<String, i64>>,
    invoices: Mutex<Vec<Value>>,
    clients: Mutex<Vec<Value>>,
    requests: Mutex<Vec<RecordedRequest>>,
    next_id: AtomicI64,
    token_gate: Mutex<Option<Arc<Gate>>>,
    me_gate: Mutex<Option<Arc<Gate>>>,
    reject_me: Mutex<bool>,
}

impl MockState {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn add_user(&self, email: &str, password: &str, full_name: Option<&str>) -> i64 {
        let id = self.next_id();
        self.users.lock().unwrap().push(MockUser {
            id,
            email: email.to_owned(),
            password: password.to_owned(),
            full_name: full_name.map(str::to_owned),
        });
        id
    }

    /// Mint a token for an existing user without going through `/auth/token`.
    pub(crate) fn issue_token(&self, email: &str) -> String {
        let id = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id)
            .expect("unknown user");
        self.mint(id)
    }

    fn mint(&self, user_id: i64) -> String {
        let token = format!("tok-{user_id}-{}", self.next_id());
        self.tokens.lock().unwrap().insert(token.clone(), user_id);
        token
    }

    /// Expire every issued token.
    pub(crate) fn revoke_all(&self) {
        self.tokens.lock().unwrap().clear();
    }

    /// Make `GET /auth/me` answer 500 regardless of token.
    pub(crate) fn fail_me(&self) {
        *self.reject_me.lock().unwrap() = true;
    }

    pub(crate) fn gate_token_endpoint(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.token_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn gate_me_endpoint(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.me_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn last_request_to(&self, path: &str) -> Option<RecordedRequest> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.path == path)
    }

    pub(crate) fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<MockUser> {
        let token = headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        let id = *self.tokens.lock().unwrap().get(token)?;
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
    }
}

pub(crate) struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub(crate) async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = router(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url: format!("http://{addr}"), state }
    }

    pub(crate) fn controller(&self, storage: impl TokenStorage + 'static) -> AuthController {
        let session = Arc::new(SessionStore::new(storage));
        AuthController::new(Gateway::new(&self.base_url, session))
    }
}

/// A base URL nothing listens on.
pub(crate) async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// =============================================================================
// ROUTER
// =============================================================================

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/auth/token", post(token))
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .route("/auth/users", get(users))
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/{id}", get(get_invoice).put(update_invoice).delete(delete_invoice))
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/{id}", get(get_client).put(update_client).delete(delete_client))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
        .with_state(state)
}

async fn record(State(state): State<Arc<MockState>>, req: Request, next: Next) -> Response {
    // The borrow of `req` must end before the await: the body is not `Sync`.
    let recorded = {
        let header_str = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        RecordedRequest {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            authorization: header_str("authorization"),
            content_type: header_str("content-type"),
            custom: header_str("x-request-source"),
        }
    };
    state.requests.lock().unwrap().push(recorded);
    next.run(req).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "detail": "Could not validate credentials" })),
    )
        .into_response()
}

fn not_found(kind: &str, id: i64) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": format!("{kind} with id {id} not found") }))).into_response()
}

fn missing_fields(body: &Value, required: &[&str]) -> Option<Response> {
    let detail: Vec<Value> = required
        .iter()
        .filter(|field| body.get(*field).is_none_or(Value::is_null))
        .map(|field| json!({ "type": "missing", "loc": ["body", field], "msg": "Field required", "input": body }))
        .collect();
    if detail.is_empty() {
        None
    } else {
        Some((StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": detail }))).into_response())
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Invoice API with Authentication is running", "version": "2.0.0" }))
}

async fn token(State(state): State<Arc<MockState>>, Form(form): Form<HashMap<String, String>>) -> Response {
    Gate::pass(&state.token_gate).await;

    if form.get("grant_type").map(String::as_str) != Some("password") {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": [{ "loc": ["body", "grant_type"], "msg": "Field required" }] })))
            .into_response();
    }
    let username = form.get("username").cloned().unwrap_or_default();
    let password = form.get("password").cloned().unwrap_or_default();
    let user = state
        .users
        .lock()
        .unwrap()
        .iter()
        .find(|u| u.email == username && u.password == password)
        .cloned();
    let Some(user) = user else {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "detail": "Incorrect email or password" })),
        )
            .into_response();
    };
    let access_token = state.mint(user.id);
    Json(json!({ "access_token": access_token, "token_type": "bearer" })).into_response()
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if let Some(rejection) = missing_fields(&body, &["email", "password"]) {
        return rejection;
    }
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();
    if password.len() < 6 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "loc": ["body", "password"], "msg": "String should have at least 6 characters" }] })),
        )
            .into_response();
    }
    if state.users.lock().unwrap().iter().any(|u| u.email == email) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Email already registered" }))).into_response();
    }
    let full_name = body["full_name"].as_str();
    let id = state.add_user(&email, &password, full_name);
    let user = MockUser { id, email, password, full_name: full_name.map(str::to_owned) };
    (StatusCode::CREATED, Json(user.to_json())).into_response()
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    Gate::pass(&state.me_gate).await;
    if *state.reject_me.lock().unwrap() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    match state.user_for(&headers) {
        Some(user) => Json(user.to_json()).into_response(),
        None => unauthorized(),
    }
}

async fn users(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let all: Vec<Value> = state
        .users
        .lock()
        .unwrap()
        .iter()
        .map(MockUser::to_json)
        .collect();
    Json(Value::Array(all)).into_response()
}

// =============================================================================
// INVOICES
// =============================================================================

async fn list_invoices(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let invoices = state.invoices.lock().unwrap().clone();
    let filtered: Vec<Value> = invoices
        .into_iter()
        .filter(|inv| query.get("status").is_none_or(|s| inv["status"] == *s))
        .collect();
    Json(Value::Array(filtered)).into_response()
}

async fn create_invoice(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    if let Some(rejection) =
        missing_fields(&body, &["invoice_number", "customer_name", "amount", "issue_date", "due_date"])
    {
        return rejection;
    }
    let mut invoice = body;
    invoice["id"] = json!(state.next_id());
    if invoice.get("status").is_none_or(Value::is_null) {
        invoice["status"] = json!("draft");
    }
    for optional in ["customer_email", "description", "updated_at"] {
        if invoice.get(optional).is_none() {
            invoice[optional] = Value::Null;
        }
    }
    invoice["created_at"] = json!(CREATED_AT);
    state.invoices.lock().unwrap().push(invoice.clone());
    (StatusCode::CREATED, Json(invoice)).into_response()
}

async fn get_invoice(State(state): State<Arc<MockState>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let found = state
        .invoices
        .lock()
        .unwrap()
        .iter()
        .find(|inv| inv["id"] == id)
        .cloned();
    found.map_or_else(|| not_found("Invoice", id), |inv| Json(inv).into_response())
}

async fn update_invoice(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let mut invoices = state.invoices.lock().unwrap();
    let Some(invoice) = invoices.iter_mut().find(|inv| inv["id"] == id) else {
        return not_found("Invoice", id);
    };
    if let Value::Object(fields) = body {
        for (key, value) in fields {
            invoice[key.as_str()] = value;
        }
    }
    invoice["updated_at"] = json!("2024-01-02T00:00:00Z");
    Json(invoice.clone()).into_response()
}

async fn delete_invoice(State(state): State<Arc<MockState>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let mut invoices = state.invoices.lock().unwrap();
    let before = invoices.len();
    invoices.retain(|inv| inv["id"] != id);
    if invoices.len() == before {
        return not_found("Invoice", id);
    }
    StatusCode::NO_CONTENT.into_response()
}

// =============================================================================
// CLIENTS
// =============================================================================

async fn list_clients(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    Json(Value::Array(state.clients.lock().unwrap().clone())).into_response()
}

async fn create_client(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    if let Some(rejection) = missing_fields(&body, &["name"]) {
        return rejection;
    }
    let mut client = body;
    client["id"] = json!(state.next_id());
    client["created_at"] = json!(CREATED_AT);
    state.clients.lock().unwrap().push(client.clone());
    (StatusCode::CREATED, Json(client)).into_response()
}

async fn get_client(State(state): State<Arc<MockState>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let found = state
        .clients
        .lock()
        .unwrap()
        .iter()
        .find(|c| c["id"] == id)
        .cloned();
    found.map_or_else(|| not_found("Client", id), |c| Json(c).into_response())
}

async fn update_client(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let mut clients = state.clients.lock().unwrap();
    let Some(client) = clients.iter_mut().find(|c| c["id"] == id) else {
        return not_found("Client", id);
    };
    if let Value::Object(fields) = body {
        for (key, value) in fields {
            client[key.as_str()] = value;
        }
    }
    client["updated_at"] = json!("2024-01-02T00:00:00Z");
    Json(client.clone()).into_response()
}

async fn delete_client(State(state): State<Arc<MockState>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if state.user_for(&headers).is_none() {
        return unauthorized();
    }
    let mut clients = state.clients.lock().unwrap();
    let before = clients.len();
    clients.retain(|c| c["id"] != id);
    if clients.len() == before {
        return not_found("Client", id);
    }
    StatusCode::NO_CONTENT.into_response()
}
