//! Axum-based HTTP surface for registration, login, and token endpoints.
//!
//! Transport hygiene on every route:
//! - Request body size limits (64KB max)
//! - Request timeouts (30s)
//! - CORS for browser-based clients
//! - Graceful shutdown on ctrl-c / SIGTERM
//!
//! Response conventions follow classic form-validation APIs: field problems
//! come back as `{"field": ["message", ...]}`, cross-field problems under
//! `"non_field_errors"`, and every rejected bearer token gets the same 401
//! body regardless of which check failed.

use crate::account::{Account, CredentialStore, MemoryStore, SqliteStore};
use crate::auth::{AuthError, AuthService, Registration};
use crate::config::Config;
use crate::password::PasswordVerifier;
use crate::token::TokenService;
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB). Auth payloads are tiny; anything
/// larger is abuse.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout. Bounded by one password hash plus store I/O.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();
    let display_addr = format!("{host}:{actual_port}");

    let store: Arc<dyn CredentialStore> = match config.store.backend.as_str() {
        "sqlite" => {
            let db_path = config.db_path();
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::open(&db_path)?;
            tracing::info!("account store ready at {}", db_path.display());
            Arc::new(store)
        }
        "memory" => {
            tracing::warn!("in-memory account store selected; accounts vanish on shutdown");
            Arc::new(MemoryStore::new())
        }
        other => {
            anyhow::bail!("unknown store backend {other:?} (expected \"sqlite\" or \"memory\")")
        }
    };

    let secret = config.resolve_secret();
    let passwords = PasswordVerifier::new(config.auth.password_rounds)?;
    let tokens = TokenService::new(
        &secret,
        config.auth.access_ttl_secs,
        config.auth.refresh_ttl_secs,
    )?;
    let state = AppState {
        auth: Arc::new(AuthService::new(store, passwords, tokens)),
    };

    println!("🔐 AuthGate listening on http://{display_addr}");
    println!("  POST /register      — create an account");
    println!("  POST /login         — exchange credentials for a token pair");
    println!("  GET  /profile       — account details (bearer access token)");
    println!("  POST /verify        — validate an access token");
    println!("  POST /token/refresh — trade a refresh token for a new pair");
    println!("  GET  /health        — health check");
    println!("  Press Ctrl+C to stop.\n");

    // ── CORS — allow browser clients to connect from any origin ──
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // Build router with middleware
    let app = Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/profile", get(handle_profile))
        .route("/verify", post(handle_verify))
        .route("/token/refresh", post(handle_token_refresh))
        .route("/health", get(handle_health))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves once the process receives ctrl-c (or SIGTERM on unix), letting
/// in-flight requests finish before the listener closes.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received; draining connections");
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Concrete return type for handlers (avoids `impl IntoResponse` inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Request body for registration. Fields are optional at parse time so
/// missing ones can be reported per field instead of failing the whole
/// deserialization.
#[derive(Deserialize)]
struct RegisterBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    password_confirm: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

/// Request body for login.
#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Request body for token refresh.
#[derive(Deserialize)]
struct RefreshBody {
    #[serde(default)]
    refresh: Option<String>,
}

/// Pull a required text field out of a request body, recording the
/// standard message when it is missing or blank. The placeholder returned
/// on failure is never used; callers bail once `errors` is non-empty.
fn take_required(
    errors: &mut serde_json::Map<String, serde_json::Value>,
    name: &str,
    value: Option<String>,
) -> String {
    let message = match value {
        Some(v) if !v.trim().is_empty() => return v,
        Some(_) => "This field may not be blank.",
        None => "This field is required.",
    };
    errors.insert(name.to_owned(), serde_json::json!([message]));
    String::new()
}

fn field_errors(errors: serde_json::Map<String, serde_json::Value>) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::Value::Object(errors)),
    )
}

/// Store or internal failures: log the detail, answer with a generic 500.
fn internal_error(err: &AuthError) -> ApiResponse {
    tracing::error!("auth backend failure: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "Internal server error"})),
    )
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the account behind the request's bearer token.
///
/// Only a missing header gets its own message. Every validation failure
/// (malformed, bad signature, expired, wrong type, unknown or disabled
/// account) collapses into the same 401 body so callers cannot probe which
/// check failed; the precise reason goes to the debug log.
async fn require_account(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Account, (StatusCode, Json<serde_json::Value>)> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Missing Authorization header"})),
        ));
    };

    match state.auth.resolve_access_token(token, Utc::now()).await {
        Ok(account) => Ok(account),
        Err(err @ (AuthError::Store(_) | AuthError::Internal(_))) => Err(internal_error(&err)),
        Err(err) => {
            tracing::debug!("access token rejected: {err}");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid or expired access token"})),
            ))
        }
    }
}

/// POST /register — create an account and return its first token pair.
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
            );
        }
    };

    let mut errors = serde_json::Map::new();
    let username = take_required(&mut errors, "username", body.username);
    let email = take_required(&mut errors, "email", body.email);
    let password = take_required(&mut errors, "password", body.password);
    let password_confirm = take_required(&mut errors, "password_confirm", body.password_confirm);
    if !errors.is_empty() {
        return field_errors(errors);
    }

    let registration = Registration {
        username,
        email,
        password,
        password_confirm,
        first_name: body.first_name.unwrap_or_default(),
        last_name: body.last_name.unwrap_or_default(),
    };

    match state.auth.register(registration, Utc::now()).await {
        Ok((account, pair)) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": account.id,
                "username": account.username,
                "email": account.email,
                "first_name": account.first_name,
                "last_name": account.last_name,
                "token": {
                    "access": pair.access,
                    "refresh": pair.refresh,
                },
                "created_at": account.created_at,
            })),
        ),
        Err(err) => registration_error(&err),
    }
}

/// Map a registration failure onto the wire: field-keyed messages for
/// field problems, `non_field_errors` for cross-field ones.
fn registration_error(err: &AuthError) -> ApiResponse {
    let body = match err {
        AuthError::PasswordMismatch => {
            serde_json::json!({"non_field_errors": [err.to_string()]})
        }
        AuthError::InvalidEmail | AuthError::DuplicateEmail => {
            serde_json::json!({"email": [err.to_string()]})
        }
        AuthError::DuplicateUsername => serde_json::json!({"username": [err.to_string()]}),
        other => return internal_error(other),
    };
    (StatusCode::BAD_REQUEST, Json(body))
}

/// POST /login — authenticate and issue a fresh token pair.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
            );
        }
    };

    let mut errors = serde_json::Map::new();
    let username = take_required(&mut errors, "username", body.username);
    let password = take_required(&mut errors, "password", body.password);
    if !errors.is_empty() {
        return field_errors(errors);
    }

    match state.auth.login(&username, &password, Utc::now()).await {
        Ok((account, pair)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "username": account.username,
                "token": {
                    "access": pair.access,
                    "refresh": pair.refresh,
                },
            })),
        ),
        Err(err @ (AuthError::InvalidCredentials | AuthError::AccountDisabled)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"non_field_errors": [err.to_string()]})),
        ),
        Err(err) => internal_error(&err),
    }
}

/// GET /profile — greeting plus the caller's account details.
async fn handle_profile(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let account = match require_account(&state, &headers).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "message": format!("Congratulations, {}!", account.username),
            "user": account.view(),
        })),
    )
}

/// POST /verify — confirm an access token and identify its holder.
async fn handle_verify(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let account = match require_account(&state, &headers).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "valid": true,
            "user": {
                "id": account.id,
                "username": account.username,
                "email": account.email,
            },
        })),
    )
}

/// POST /token/refresh — rotate a refresh token into a brand-new pair.
/// The old pair is simply superseded; nothing server-side tracks it.
async fn handle_token_refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Invalid request: {e}")})),
            );
        }
    };

    let mut errors = serde_json::Map::new();
    let refresh = take_required(&mut errors, "refresh", body.refresh);
    if !errors.is_empty() {
        return field_errors(errors);
    }

    match state.auth.refresh(&refresh, Utc::now()) {
        Ok(pair) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "access": pair.access,
                "refresh": pair.refresh,
            })),
        ),
        Err(err @ AuthError::Token(_)) => {
            tracing::debug!("refresh token rejected: {err}");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid or expired refresh token"})),
            )
        }
        Err(err) => internal_error(&err),
    }
}

/// GET /health — always public (no account data leaked)
async fn handle_health() -> ApiResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}
