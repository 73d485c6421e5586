use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::handlers::{
    buzzer_lock, diagnostics, display_approve, health_check, ready_check, snapshot, timer_pause,
    timer_reset, timer_resume, timer_start,
};
use crate::routes::auth_middleware::auth_middleware;
use crate::state::AppState;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/sessions/:session_id/snapshot", get(snapshot))
        .route("/v1/sessions/:session_id/timer/start", post(timer_start))
        .route("/v1/sessions/:session_id/timer/pause", post(timer_pause))
        .route("/v1/sessions/:session_id/timer/resume", post(timer_resume))
        .route("/v1/sessions/:session_id/timer/reset", post(timer_reset))
        .route("/v1/sessions/:session_id/buzzer/lock", post(buzzer_lock))
        .route(
            "/v1/sessions/:session_id/displays/:display_id/approve",
            post(display_approve),
        )
        .route_layer(middleware::from_fn(auth_middleware)) // Applies to all routes added above
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .with_state(state)
}
