//! HTTP trigger for collection windows.
//!
//! `GET /collect?seconds=N` validates the requested window length and hands
//! it to the collector manager; the batch itself is delivered asynchronously
//! to the publishers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use metal_collector::error::TriggerError;
use metal_collector::manager::WindowTrigger;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub trigger: WindowTrigger,
    pub default_window_secs: u64,
    pub min_window_secs: u64,
}

#[derive(Deserialize)]
struct CollectParams {
    seconds: Option<String>,
}

#[derive(Serialize)]
struct CollectResponse {
    seconds: u64,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SecondsError {
    #[error("seconds must be integer")]
    NotInteger,
    #[error("seconds must be at least {0}")]
    TooShort(u64),
}

/// Absent or empty means `default`; anything else must be an integer of at
/// least `min`.
pub fn parse_seconds(raw: Option<&str>, default: u64, min: u64) -> Result<u64, SecondsError> {
    let raw = match raw {
        None | Some("") => return Ok(default),
        Some(raw) => raw,
    };
    let seconds: i64 = raw.parse().map_err(|_| SecondsError::NotInteger)?;
    match u64::try_from(seconds) {
        Ok(seconds) if seconds >= min => Ok(seconds),
        _ => Err(SecondsError::TooShort(min)),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/collect", get(handle_collect))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_collect(
    State(state): State<AppState>,
    Query(params): Query<CollectParams>,
) -> Response {
    let seconds = match parse_seconds(
        params.seconds.as_deref(),
        state.default_window_secs,
        state.min_window_secs,
    ) {
        Ok(seconds) => seconds,
        Err(e) => {
            tracing::warn!(seconds = ?params.seconds, error = %e, "Rejected collect request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match state.trigger.request(Duration::from_secs(seconds)) {
        Ok(()) => {
            tracing::info!(seconds, "Collection window requested");
            (StatusCode::ACCEPTED, Json(CollectResponse { seconds })).into_response()
        }
        Err(e @ TriggerError::Busy) => {
            tracing::warn!(seconds, "Collect request rejected, window in progress");
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e @ TriggerError::Closed) => {
            tracing::error!(seconds, "Collect request rejected, manager stopped");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
