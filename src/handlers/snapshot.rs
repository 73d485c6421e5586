// Full session snapshot for reconnecting clients: timer, buzzer, displays,
// scores for online teams and the current round when the session service is
// reachable.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::warn;

use crate::auth::auth;
use crate::clients::session_service;
use crate::db::scoredb;
use crate::handlers::{error_response, store_error};
use crate::models::{BuzzerSnapshot, ErrorResponse, SnapshotResponse};
use crate::services::auth_service::SessionClaims;
use crate::state::AppState;

pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<i64>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<(StatusCode, Json<SnapshotResponse>), (StatusCode, Json<ErrorResponse>)> {
    if !auth::session_permitted(&claims, session_id) {
        return Err(error_response(StatusCode::FORBIDDEN, "Token not valid for this session"));
    }

    let timer = state.timers.state(session_id).await.map_err(store_error)?;
    let buzzer = BuzzerSnapshot {
        locked: state.arbiter.is_locked(session_id).await.map_err(store_error)?,
        queue: state.arbiter.queue(session_id).await.map_err(store_error)?,
        first: state.arbiter.first(session_id).await.map_err(store_error)?,
    };
    let displays = state.displays.list(session_id).await.map_err(store_error)?;

    let scores = match scoredb::get_db() {
        Some(db) => {
            let teams = state.registry.online_team_ids(session_id).await;
            db.team_totals(session_id, &teams).await.unwrap_or_else(|e| {
                warn!("session {}: snapshot score query failed: {}", session_id, e);
                Vec::new()
            })
        }
        None => Vec::new(),
    };

    // Round metadata is display-only; a failed lookup degrades to none.
    let round = match session_service::get_session_service_client() {
        Some(client) => client.current_round(session_id).await.unwrap_or_else(|e| {
            warn!("session {}: round lookup failed: {}", session_id, e);
            None
        }),
        None => None,
    };

    Ok((
        StatusCode::OK,
        Json(SnapshotResponse { session_id, timer, buzzer, displays, scores, round }),
    ))
}
