// Moderator approval of display endpoints.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::auth::auth;
use crate::handlers::store_error;
use crate::models::{DisplayApproveRequest, DisplayRecord, ErrorResponse, Event, Role};
use crate::services::auth_service::SessionClaims;
use crate::state::AppState;

pub async fn display_approve(
    State(state): State<Arc<AppState>>,
    Path((session_id, display_id)): Path<(i64, String)>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<DisplayApproveRequest>,
) -> Result<(StatusCode, Json<DisplayRecord>), (StatusCode, Json<ErrorResponse>)> {
    auth::ensure_moderator(&claims, session_id)?;

    let record = state
        .displays
        .approve(session_id, &display_id, body.role, &claims.sub)
        .await
        .map_err(store_error)?;
    info!(
        "session {}: display {} approved as {:?} by {}",
        session_id, display_id, body.role, claims.sub
    );

    state
        .registry
        .broadcast(
            session_id,
            &Event::DisplayApproved { display_id: display_id.clone(), role: body.role },
            Some(Role::Display),
        )
        .await;
    state
        .registry
        .broadcast(
            session_id,
            &Event::DisplayStatus { display: record.clone() },
            Some(Role::Moderator),
        )
        .await;

    Ok((StatusCode::OK, Json(record)))
}
