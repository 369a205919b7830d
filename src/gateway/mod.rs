//! Axum-based HTTP gateway.
//!
//! Thin request handlers over the roster and session stores:
//! - Proper HTTP/1.1 parsing and method routing (wrong method → 405)
//! - Request body size limit (64KB) and request timeouts
//! - Session transport via an HttpOnly cookie
//! - Sliding-window rate limiting on login attempts
//!
//! No state is cached across requests: every handler re-reads the
//! stored document, mutates an in-memory copy, and recommits in full.
//! The pointer repoint inside `commit` is the only cross-request
//! interaction.

use crate::config::Config;
use crate::error::ApiError;
use crate::roster::{Role, Roster, UserRecord, UserUpdate, FIELD_DELIMITER, USERS_HEADER};
use crate::security;
use crate::session::{Identity, SessionStore, SESSIONS_HEADER};
use crate::store::{self, DocumentStore, ObjectStore};
use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout — every handler is a handful of store round-trips.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Sliding window used by login rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Cookie carrying the session token.
const SESSION_COOKIE: &str = "session";

/// How often the rate limiter sweeps stale client entries from its map.
const RATE_LIMITER_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    limit_per_window: u32,
    window: Duration,
    requests: Mutex<(HashMap<String, Vec<Instant>>, Instant)>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            requests: Mutex::new((HashMap::new(), Instant::now())),
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        if self.limit_per_window == 0 {
            return true;
        }

        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or_else(Instant::now);

        let mut guard = self.requests.lock();
        let (requests, last_sweep) = &mut *guard;

        // Periodic sweep: drop clients with no recent attempts.
        if last_sweep.elapsed() >= Duration::from_secs(RATE_LIMITER_SWEEP_INTERVAL_SECS) {
            requests.retain(|_, timestamps| {
                timestamps.retain(|t| *t > cutoff);
                !timestamps.is_empty()
            });
            *last_sweep = now;
        }

        let entry = requests.entry(key.to_owned()).or_default();
        entry.retain(|instant| *instant > cutoff);

        if entry.len() >= self.limit_per_window as usize {
            return false;
        }

        entry.push(now);
        true
    }
}

fn client_key_from_headers(headers: &HeaderMap) -> String {
    for header_name in ["X-Forwarded-For", "X-Real-IP"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    "unknown".into()
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub users: Arc<DocumentStore>,
    pub sessions: Arc<SessionStore>,
    pub login_limiter: Arc<SlidingWindowRateLimiter>,
    pub session_ttl_secs: u64,
    pub min_password_len: usize,
}

/// Assemble handler state over an already-constructed backend.
pub fn build_state(config: &Config, store: Arc<dyn ObjectStore>, seed: Option<String>) -> AppState {
    let users = Arc::new(DocumentStore::new(
        store.clone(),
        &config.store.prefix,
        "users",
        USERS_HEADER,
        seed,
        config.store.keep_versions,
    ));
    let sessions_doc = DocumentStore::new(
        store.clone(),
        &config.store.prefix,
        "sessions",
        SESSIONS_HEADER,
        None,
        config.store.keep_versions,
    );
    let sessions = Arc::new(SessionStore::new(sessions_doc, config.auth.session_ttl_secs));

    AppState {
        store,
        users,
        sessions,
        login_limiter: Arc::new(SlidingWindowRateLimiter::new(
            config.gateway.login_per_minute,
            Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        )),
        session_ttl_secs: config.auth.session_ttl_secs,
        min_password_len: config.auth.min_password_len,
    }
}

/// Read the packaged seed document, if one is configured.
pub fn load_seed(config: &Config) -> Option<String> {
    let path = config.store.seed_path.as_ref()?;
    match std::fs::read_to_string(path) {
        Ok(seed) => Some(seed),
        Err(e) => {
            tracing::warn!("Failed to read seed document {}: {e}", path.display());
            None
        }
    }
}

/// Build the router with all middleware layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/register", post(handle_register))
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/me", get(handle_me))
        .route("/api/users/list", get(handle_users_list))
        .route("/api/users/update", post(handle_user_update))
        .route("/api/users/delete", post(handle_user_delete))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until the process is stopped.
pub async fn run_gateway(config: Config) -> Result<()> {
    let store = store::create_object_store(&config.store)?;
    let seed = load_seed(&config);
    let state = build_state(&config, store, seed);

    // Bootstrap is explicit and idempotent; a failure here degrades to
    // fallback reads rather than refusing to serve.
    if let Err(e) = state.users.ensure_initialized().await {
        tracing::warn!("Roster bootstrap failed, serving fallback until the store recovers: {e}");
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// SESSION COOKIE HELPERS
// ══════════════════════════════════════════════════════════════════════════════

/// Extract the session token from the Cookie header.
fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_owned())
    })
}

fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Resolve the caller's session or fail with 401.
async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token = session_token_from_headers(headers).ok_or(ApiError::Unauthorized)?;
    state
        .sessions
        .validate(&token)
        .await
        .ok_or(ApiError::Unauthorized)
}

/// Resolve the caller's session and require the Admin role.
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let identity = require_session(state, headers).await?;
    if !identity.role.is_admin() {
        return Err(ApiError::Forbidden);
    }
    Ok(identity)
}

// ══════════════════════════════════════════════════════════════════════════════
// VALIDATION HELPERS
// ══════════════════════════════════════════════════════════════════════════════

/// The stored format has no escaping, so delimiter-unsafe values are
/// rejected before they can corrupt a row.
fn contains_delimiter(value: &str) -> bool {
    value.contains(FIELD_DELIMITER)
}

fn unwrap_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(inner)) => Ok(inner),
        Err(_) => Err(ApiError::Validation("Invalid or missing JSON body".into())),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — always public.
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.store.name(),
        "reachable": state.store.health_check().await,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// POST /api/register — create an account with the default role.
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = unwrap_body(body)?;

    let first_name = body.first_name.trim();
    let last_name = body.last_name.trim();
    let email = body.email.trim();
    if first_name.is_empty() || last_name.is_empty() || email.is_empty() || body.password.is_empty()
    {
        return Err(ApiError::Validation(
            "First name, last name, email, and password are required".into(),
        ));
    }
    if [first_name, last_name, email]
        .iter()
        .any(|v| contains_delimiter(v))
    {
        return Err(ApiError::Validation(
            "First name, last name, and email cannot contain commas".into(),
        ));
    }
    if body.password.len() < state.min_password_len {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            state.min_password_len
        )));
    }

    let snapshot = state.users.load().await;
    let mut roster = Roster::parse(&snapshot.document);
    if roster.find_by_email(email).is_some() {
        return Err(ApiError::Validation(
            "An account with this email already exists".into(),
        ));
    }

    let hashed = security::hash_password(&body.password);
    roster.insert(UserRecord::new(
        first_name,
        last_name,
        email,
        &hashed,
        Role::Author,
    ));
    state
        .users
        .commit(&roster.serialize(), snapshot.version.as_deref())
        .await?;

    tracing::info!("Registered new account");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "user": {
                "firstName": first_name,
                "lastName": last_name,
                "email": email,
                "role": Role::Author.as_str(),
            },
        })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// POST /api/login — verify credentials and mint a session cookie.
async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    if !state.login_limiter.allow(&client_key_from_headers(&headers)) {
        return Err(ApiError::RateLimited);
    }

    let body = unwrap_body(body)?;
    let email = body.email.trim();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()));
    }

    let snapshot = state.users.load().await;
    let roster = Roster::parse(&snapshot.document);
    let Some(record) = roster.find_by_email(email) else {
        // Same work and same answer as a wrong password.
        security::dummy_verify(&body.password);
        return Err(ApiError::InvalidCredentials);
    };
    if !security::verify_password(&body.password, &record.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let role = record.role();
    let token = state.sessions.issue(&record.email, role).await?;

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session_cookie(&token, state.session_ttl_secs),
        )],
        Json(serde_json::json!({
            "success": true,
            "user": {
                "firstName": record.first_name,
                "lastName": record.last_name,
                "email": record.email,
                "role": role.as_str(),
            },
        })),
    )
        .into_response())
}

/// POST /api/logout — revoke the presented session and clear the
/// cookie. Succeeds whether or not a session was presented.
async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token_from_headers(&headers) {
        state.sessions.revoke(&token).await?;
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response())
}

/// GET /api/me — the identity behind the presented session.
async fn handle_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = require_session(&state, &headers).await?;
    Ok(Json(serde_json::json!({
        "email": identity.email,
        "role": identity.role.as_str(),
    }))
    .into_response())
}

/// GET /api/users/list — Admin only.
async fn handle_users_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers).await?;

    let snapshot = state.users.load().await;
    let roster = Roster::parse(&snapshot.document);
    Ok(Json(serde_json::json!({ "users": roster.summaries() })).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserUpdateBody {
    #[serde(default)]
    target_email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    role: Option<String>,
}

/// POST /api/users/update — Admin only. Partial update; the password
/// hash is never touched.
async fn handle_user_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UserUpdateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers).await?;

    let body = unwrap_body(body)?;
    let target_email = body.target_email.trim();
    if target_email.is_empty() {
        return Err(ApiError::Validation("targetEmail is required".into()));
    }
    for value in [&body.first_name, &body.last_name, &body.email]
        .into_iter()
        .flatten()
    {
        if contains_delimiter(value) {
            return Err(ApiError::Validation(
                "First name, last name, and email cannot contain commas".into(),
            ));
        }
    }

    let snapshot = state.users.load().await;
    let mut roster = Roster::parse(&snapshot.document);
    if roster.find_by_email(target_email).is_none() {
        return Err(ApiError::NotFound("User not found"));
    }

    roster.update(
        target_email,
        &UserUpdate {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            role: body.role,
        },
    );
    state
        .users
        .commit(&roster.serialize(), snapshot.version.as_deref())
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "users": roster.summaries(),
    }))
    .into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDeleteBody {
    #[serde(default)]
    target_email: String,
}

/// POST /api/users/delete — Admin only.
async fn handle_user_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UserDeleteBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers).await?;

    let body = unwrap_body(body)?;
    let target_email = body.target_email.trim();
    if target_email.is_empty() {
        return Err(ApiError::Validation("targetEmail is required".into()));
    }

    let snapshot = state.users.load().await;
    let mut roster = Roster::parse(&snapshot.document);
    if roster.find_by_email(target_email).is_none() {
        return Err(ApiError::NotFound("User not found"));
    }

    roster.delete(target_email);
    state
        .users
        .commit(&roster.serialize(), snapshot.version.as_deref())
        .await?;

    Ok(Json(serde_json::json!({ "success": true })).into_response())
}

// ══════════════════════════════════════════════════════════════════════════════
// TESTS
// ══════════════════════════════════════════════════════════════════════════════
