use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Functional category of a connection within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Display,
    Presenter,
    Contestant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Moderator => "moderator",
            Role::Display => "display",
            Role::Presenter => "presenter",
            Role::Contestant => "contestant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "moderator" => Some(Role::Moderator),
            "display" => Some(Role::Display),
            "presenter" => Some(Role::Presenter),
            "contestant" => Some(Role::Contestant),
            _ => None,
        }
    }
}

/// Countdown phase of a session timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Counting,
    Paused,
    Stopped,
}

impl TimerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Counting => "counting",
            TimerPhase::Paused => "paused",
            TimerPhase::Stopped => "stopped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(TimerPhase::Idle),
            "counting" => Some(TimerPhase::Counting),
            "paused" => Some(TimerPhase::Paused),
            "stopped" => Some(TimerPhase::Stopped),
            _ => None,
        }
    }
}

/// Snapshot of a session timer as stored in the shared store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimerState {
    pub phase: TimerPhase,
    pub duration_ms: i64,
    pub remaining_ms: i64,
    pub started_at: i64,
}

/// Lifecycle status of an auxiliary display endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Pending,
    Approved,
    Connected,
    Disconnected,
}

/// Assigned display role. Protected displays gate presenter publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisplayRole {
    Protected,
    Normal,
}

/// Registry record for one display endpoint. Mutated by merge-update only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisplayRecord {
    pub display_id: String,
    pub status: DisplayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<DisplayRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub last_seen: i64,
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<i64>,
}

/// Partial update for a display record. Absent fields are left untouched;
/// metrics are merged key by key.
#[derive(Debug, Clone, Default)]
pub struct DisplayUpdate {
    pub status: Option<DisplayStatus>,
    pub role: Option<DisplayRole>,
    pub name: Option<String>,
    pub metrics: Option<HashMap<String, serde_json::Value>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
}

/// One entry of the session buzz queue, as broadcast to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BuzzQueueEntry {
    pub team_id: i64,
    pub device_id: String,
    pub rank: u32,
    pub instant_us: i64,
}

/// Team total read from the canonical score ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamScore {
    pub team_id: i64,
    pub team_name: String,
    pub total: i64,
}

/// Current round metadata read from the session service, display-only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoundInfo {
    pub round_id: i64,
    pub phase: String,
}
