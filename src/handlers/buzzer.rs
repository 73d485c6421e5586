// Moderator buzzer controls: the explicit lock, and the fresh-window clear
// that goes with releasing it.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::auth::auth;
use crate::handlers::store_error;
use crate::models::{BuzzerLockRequest, ErrorResponse, Event, MessageResponse};
use crate::services::auth_service::SessionClaims;
use crate::state::AppState;

pub async fn buzzer_lock(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<BuzzerLockRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), (StatusCode, Json<ErrorResponse>)> {
    auth::ensure_moderator(&claims, session_id)?;

    let message = if body.locked {
        state.arbiter.lock(session_id).await.map_err(store_error)?;
        info!("session {}: buzzer locked by {}", session_id, claims.sub);
        "Buzzer locked"
    } else {
        // Unlock clears the queue and opens a fresh buzz window.
        state.arbiter.unlock(session_id).await.map_err(store_error)?;
        info!("session {}: buzzer unlocked and cleared by {}", session_id, claims.sub);
        state.registry.broadcast(session_id, &Event::BuzzerCleared, None).await;
        "Buzzer unlocked"
    };

    let locked = state.arbiter.is_locked(session_id).await.map_err(store_error)?;
    let queue = state.arbiter.queue(session_id).await.map_err(store_error)?;
    state.registry.broadcast(session_id, &Event::BuzzerStatus { locked, queue }, None).await;

    Ok((StatusCode::OK, Json(MessageResponse { message: message.to_string() })))
}
