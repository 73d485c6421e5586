// Moderator timer controls. Every transition goes through the engine; the
// resulting ticks reach clients over the session tick channel.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::auth::auth;
use crate::handlers::{error_response, store_error};
use crate::models::{ErrorResponse, MessageResponse, TimerStartRequest};
use crate::services::auth_service::SessionClaims;
use crate::state::AppState;

const DEFAULT_DURATION_MS: i64 = 30_000;

type HandlerResult = Result<(StatusCode, Json<MessageResponse>), (StatusCode, Json<ErrorResponse>)>;

pub async fn timer_start(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<TimerStartRequest>,
) -> HandlerResult {
    auth::ensure_moderator(&claims, session_id)?;

    let duration_ms = body.duration_ms.unwrap_or(DEFAULT_DURATION_MS);
    if duration_ms <= 0 {
        return Err(error_response(StatusCode::BAD_REQUEST, "Duration must be positive"));
    }

    state.timers.start(session_id, duration_ms).await.map_err(store_error)?;
    info!("session {}: timer started for {} ms by {}", session_id, duration_ms, claims.sub);
    Ok((StatusCode::OK, Json(MessageResponse { message: "Timer started".to_string() })))
}

pub async fn timer_pause(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Extension(claims): Extension<SessionClaims>,
) -> HandlerResult {
    auth::ensure_moderator(&claims, session_id)?;

    if !state.timers.pause(session_id).await.map_err(store_error)? {
        return Err(error_response(StatusCode::CONFLICT, "No running countdown to pause"));
    }
    info!("session {}: timer paused by {}", session_id, claims.sub);
    Ok((StatusCode::OK, Json(MessageResponse { message: "Timer paused".to_string() })))
}

pub async fn timer_resume(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Extension(claims): Extension<SessionClaims>,
) -> HandlerResult {
    auth::ensure_moderator(&claims, session_id)?;

    if !state.timers.resume(session_id).await.map_err(store_error)? {
        return Err(error_response(StatusCode::CONFLICT, "No paused countdown to resume"));
    }
    info!("session {}: timer resumed by {}", session_id, claims.sub);
    Ok((StatusCode::OK, Json(MessageResponse { message: "Timer resumed".to_string() })))
}

pub async fn timer_reset(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Extension(claims): Extension<SessionClaims>,
) -> HandlerResult {
    auth::ensure_moderator(&claims, session_id)?;

    state.timers.reset(session_id).await.map_err(store_error)?;
    info!("session {}: timer reset by {}", session_id, claims.sub);
    Ok((StatusCode::OK, Json(MessageResponse { message: "Timer reset".to_string() })))
}
