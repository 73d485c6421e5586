use utoipa::OpenApi;

use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Hub-wide diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics for the running hub", body = DiagnosticsResponse),
        (status = 403, description = "Moderator access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Full session snapshot
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}/snapshot",
    params(
        ("session_id" = i64, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Current session snapshot", body = SnapshotResponse),
        (status = 403, description = "Token not valid for this session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn snapshot_doc() {}

/// Start a countdown
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/timer/start",
    params(
        ("session_id" = i64, Path, description = "Session identifier")
    ),
    request_body = TimerStartRequest,
    responses(
        (status = 200, description = "Countdown started", body = MessageResponse),
        (status = 400, description = "Invalid duration", body = ErrorResponse),
        (status = 403, description = "Moderator access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn timer_start_doc() {}

/// Pause the running countdown
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/timer/pause",
    params(
        ("session_id" = i64, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Countdown paused", body = MessageResponse),
        (status = 409, description = "No running countdown", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn timer_pause_doc() {}

/// Resume a paused countdown
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/timer/resume",
    params(
        ("session_id" = i64, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Countdown resumed", body = MessageResponse),
        (status = 409, description = "No paused countdown", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn timer_resume_doc() {}

/// Reset the timer
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/timer/reset",
    params(
        ("session_id" = i64, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Timer cleared", body = MessageResponse)
    )
)]
#[allow(dead_code)]
pub async fn timer_reset_doc() {}

/// Lock or unlock the buzzer
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/buzzer/lock",
    params(
        ("session_id" = i64, Path, description = "Session identifier")
    ),
    request_body = BuzzerLockRequest,
    responses(
        (status = 200, description = "Lock state changed", body = MessageResponse),
        (status = 403, description = "Moderator access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn buzzer_lock_doc() {}

/// Approve a display endpoint
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/displays/{display_id}/approve",
    params(
        ("session_id" = i64, Path, description = "Session identifier"),
        ("display_id" = String, Path, description = "Display identifier")
    ),
    request_body = DisplayApproveRequest,
    responses(
        (status = 200, description = "Display approved", body = DisplayRecord),
        (status = 403, description = "Moderator access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn display_approve_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        diagnostics_doc,
        snapshot_doc,
        timer_start_doc,
        timer_pause_doc,
        timer_resume_doc,
        timer_reset_doc,
        buzzer_lock_doc,
        display_approve_doc,
    ),
    components(
        schemas(
            HealthResponse,
            MessageResponse,
            ErrorResponse,
            DiagnosticsResponse,
            SnapshotResponse,
            BuzzerSnapshot,
            BuzzQueueEntry,
            TimerStartRequest,
            TimerState,
            TimerPhase,
            BuzzerLockRequest,
            DisplayApproveRequest,
            DisplayRecord,
            DisplayStatus,
            DisplayRole,
            TeamScore,
            RoundInfo,
            Role,
        )
    ),
    tags(
        (name = "api", description = "Session hub API endpoints")
    )
)]
pub struct ApiDoc;
