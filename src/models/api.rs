use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::records::{
    BuzzQueueEntry, DisplayRecord, DisplayRole, RoundInfo, TeamScore, TimerState,
};

/// API response for health check
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TimerStartRequest {
    /// Countdown duration in milliseconds; defaults to 30 seconds.
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BuzzerLockRequest {
    pub locked: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DisplayApproveRequest {
    pub role: DisplayRole,
}

/// Buzz queue plus lock status, as embedded in snapshots.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BuzzerSnapshot {
    pub locked: bool,
    pub queue: Vec<BuzzQueueEntry>,
    /// `team:device` member that buzzed first in the open window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
}

/// Full session snapshot for reconnecting clients and the main display.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SnapshotResponse {
    pub session_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerState>,
    pub buzzer: BuzzerSnapshot,
    pub displays: Vec<DisplayRecord>,
    pub scores: Vec<TeamScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundInfo>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_sessions: u32,
    pub n_connections: u32,
    pub n_running_timers: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
