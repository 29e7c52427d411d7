//! HTTP request handlers for the key API.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use orchestrator_keys::{KeyError, KeyId, KeyInfo, KeyStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::CorsConfig;

/// Shared application state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: KeyStore,
}

impl AppState {
    #[must_use]
    pub const fn new(store: KeyStore) -> Self {
        Self { store }
    }
}

/// Response body for key creation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyResponse {
    pub key_id: KeyId,
}

/// Response body for key retrieval.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetKeyResponse {
    pub key_id: KeyId,
    pub key: String,
}

/// Response body for the key info endpoint.
///
/// Timestamps are ISO-8601 UTC strings, `expiresAt` is `"never"` while no
/// lease is engaged.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfoResponse {
    pub is_blocked: bool,
    pub created_at: String,
    pub expires_at: String,
    pub last_activity: String,
}

impl From<KeyInfo> for KeyInfoResponse {
    fn from(info: KeyInfo) -> Self {
        Self {
            is_blocked: info.blocked,
            created_at: iso8601(info.created_at),
            expires_at: info
                .expires_at
                .map_or_else(|| "never".to_owned(), iso8601),
            last_activity: iso8601(info.last_activity),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn message_response(message: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: message.to_owned(),
    })
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub(crate) status_code: StatusCode,
    pub(crate) message: String,
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        let status_code = match err {
            KeyError::NotFound => StatusCode::NOT_FOUND,
            KeyError::Forbidden(_) => StatusCode::FORBIDDEN,
            KeyError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        };

        Self {
            status_code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status_code,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Create the router with all endpoints.
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/keys", post(create_key_handler))
        .route(
            "/keys/:key_id",
            get(get_key_handler)
                .put(block_key_handler)
                .delete(delete_key_handler),
        )
        .route("/keys/:key_id/info", get(key_info_handler))
        .route("/keys/:key_id/alive", put(keep_alive_handler))
        .layer(cors.layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A path segment that is not a well-formed id cannot name a key.
fn parse_key_id(raw: &str) -> Result<KeyId, ApiError> {
    raw.parse::<KeyId>().map_err(|err| {
        debug!(key_id = raw, %err, "Rejected malformed key id");
        ApiError::from(KeyError::NotFound)
    })
}

fn iso8601(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "service": "token-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
        "keys": state.store.stats(),
    }))
}

async fn create_key_handler(State(state): State<AppState>) -> impl IntoResponse {
    let issued = state.store.issue();

    info!(key_id = %issued.id, "Created key");

    (
        StatusCode::CREATED,
        Json(CreateKeyResponse { key_id: issued.id }),
    )
}

async fn get_key_handler(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<GetKeyResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    let secret = state.store.fetch(&key_id)?;

    Ok(Json(GetKeyResponse {
        key_id,
        key: secret.expose().to_owned(),
    }))
}

async fn key_info_handler(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<KeyInfoResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    let info = state.store.describe(&key_id)?;

    Ok(Json(info.into()))
}

async fn delete_key_handler(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    state.store.delete(&key_id)?;

    info!(%key_id, "Deleted key");

    Ok(message_response("Key deleted successfully"))
}

/// Block or unblock a key, body `{"blocked": <bool>}`.
///
/// The body is read raw so that a malformed document is reported as a bad
/// flag, and only once the key is known to exist.
async fn block_key_handler(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;

    let blocked = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|body| body.get("blocked").and_then(Value::as_bool));

    let blocked = state.store.set_blocked(&key_id, blocked)?;

    info!(%key_id, blocked, "Updated key block flag");

    let message = if blocked {
        "Key blocked successfully"
    } else {
        "Key unblocked successfully"
    };

    Ok(message_response(message))
}

async fn keep_alive_handler(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key_id = parse_key_id(&key_id)?;
    let _expires_at = state.store.keep_alive(&key_id)?;

    Ok(message_response("Key keep-alive signal received"))
}
