use std::sync::{Arc, Mutex, OnceLock};

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::Json;
use sysinfo::System;
use tracing::info;

use crate::auth::auth;
use crate::handlers::error_response;
use crate::models::{DiagnosticsResponse, ErrorResponse};
use crate::services::auth_service::SessionClaims;
use crate::state::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Hub-wide diagnostics
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    // Moderator-only, regardless of session binding
    if !auth::is_moderator(&claims) {
        return Err(error_response(StatusCode::FORBIDDEN, "Moderator access required"));
    }

    let n_sessions = state.registry.session_count().await as u32;
    let n_connections = state.registry.connection_count().await as u32;
    let n_running_timers = state.timers.running_count().await as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Sessions: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_connections,
        n_sessions
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions,
            n_connections,
            n_running_timers,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
