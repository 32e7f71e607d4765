//! HTTP routes for the Bender API.
//!
//! - `GET /health` liveness probe
//! - `POST /api/invoke` posts a message to a channel, runs Claude Code on it
//!   in a fresh thread and returns the answer

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bender_common::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::claude::ClaudeError;
use crate::dispatch::{error_text, Dispatcher};
use crate::traits::{ChatPoster, Reply};

/// Maximum accepted request body size.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// State
// ============================================================================

/// Shared state for the HTTP server.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Posts the API message and replies into Slack
    pub poster: Arc<dyn ChatPoster>,
    /// Bearer key clients must present; `None` disables the endpoint
    pub api_key: Option<Arc<str>>,
}

/// Create the HTTP state. An empty API key counts as unconfigured.
pub fn create_state(
    dispatcher: Arc<Dispatcher>,
    poster: Arc<dyn ChatPoster>,
    api_key: Option<String>,
) -> Arc<AppState> {
    Arc::new(AppState {
        dispatcher,
        poster,
        api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
    })
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub thread_ts: String,
    pub session_id: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn status_of(err: &Error) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Health
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

// ============================================================================
// Invoke
// ============================================================================

async fn invoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ApiRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = authorize(state.api_key.as_deref(), &headers) {
        tracing::warn!(error = %e, "Rejected API request");
        return error_response(status_of(&e), e.to_string());
    }

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, rejection.body_text());
        }
        Err(rejection) => {
            let e = Error::Validation(rejection.body_text());
            return error_response(status_of(&e), e.to_string());
        }
    };

    match run_invoke(&state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(status_of(&e), e.to_string()),
    }
}

async fn run_invoke(state: &AppState, request: ApiRequest) -> bender_common::Result<ApiResponse> {
    let channel = request.channel.trim();
    let message = request.message.trim();
    if channel.is_empty() {
        return Err(Error::Validation("channel must not be empty".into()));
    }
    if message.is_empty() {
        return Err(Error::Validation("message must not be empty".into()));
    }

    let thread_ts = state.poster.post_message(channel, message, None).await?;
    tracing::info!(channel = %channel, thread_ts = %thread_ts, "API message posted");

    let response = match state.dispatcher.start_thread(&thread_ts, message).await {
        Ok(response) => response,
        Err(e) => {
            if !matches!(e, ClaudeError::NotFound { .. }) {
                apologize(state, channel, &thread_ts, &e).await;
            }
            return Err(e.into());
        }
    };

    state
        .poster
        .post_reply(&Reply::new(channel, &thread_ts, &response.result))
        .await?;

    Ok(ApiResponse {
        thread_ts,
        session_id: response.session_id,
        response: response.result,
    })
}

/// Best-effort failure notice in the thread.
async fn apologize(state: &AppState, channel: &str, thread_ts: &str, err: &ClaudeError) {
    let reply = Reply::new(channel, thread_ts, error_text(err));
    if let Err(post_err) = state.poster.post_reply(&reply).await {
        tracing::warn!(thread_ts = %thread_ts, error = %post_err, "Failed to post error notice");
    }
}

fn authorize(expected: Option<&str>, headers: &HeaderMap) -> bender_common::Result<()> {
    let Some(expected) = expected else {
        return Err(Error::Config("API key not configured".into()));
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Error::Unauthorized("Missing or invalid Authorization header".into()))?;

    if !constant_time_eq(provided.trim(), expected) {
        return Err(Error::Unauthorized("Invalid API key".into()));
    }
    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the Bender HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/invoke", post(invoke))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tokio_test::{assert_err, assert_ok};

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_authorize_accepts_matching_key() {
        assert_ok!(authorize(Some("secret"), &headers("Bearer secret")));
        assert_ok!(authorize(Some("secret"), &headers("Bearer  secret ")));
    }

    #[test]
    fn test_authorize_unconfigured_is_config_error() {
        let err = authorize(None, &headers("Bearer secret")).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_authorize_rejects_bad_headers() {
        for value in ["Bearer wrong", "Basic secret", "secret", "Bearer "] {
            let err = authorize(Some("secret"), &headers(value)).unwrap_err();
            assert_eq!(err.status_code(), 401, "header {value:?}");
        }
        let err = assert_err!(authorize(Some("secret"), &HeaderMap::new()));
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn test_error_status_conversion() {
        assert_eq!(status_of(&Error::UpstreamPost("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(&Error::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
