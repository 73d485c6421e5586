use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::records::{BuzzQueueEntry, DisplayRecord, DisplayRole, TeamScore};

/// Closed set of messages a connected client may send. Anything that does not
/// parse into one of these variants is dropped at the connection boundary.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join(JoinMessage),
    #[serde(rename = "buzz")]
    Buzz(BuzzMessage),
    #[serde(rename = "offer")]
    Offer(SdpMessage),
    #[serde(rename = "answer")]
    Answer(SdpMessage),
    #[serde(rename = "ice-candidate")]
    IceCandidate(IceMessage),
    #[serde(rename = "status-update")]
    StatusUpdate(StatusUpdateMessage),
}

#[derive(Debug, Deserialize)]
pub struct JoinMessage {
    #[serde(default)]
    pub display_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuzzMessage {
    #[serde(default)]
    pub team_id: Option<i64>,
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SdpMessage {
    pub sdp: String,
}

#[derive(Debug, Deserialize)]
pub struct IceMessage {
    pub candidate: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateMessage {
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
}

/// Events broadcast to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "buzzer.update")]
    BuzzerUpdate { team_id: i64, device_id: String, rank: u32, is_first: bool },
    #[serde(rename = "buzzer.accepted")]
    BuzzerAccepted { rank: u32, is_first: bool },
    #[serde(rename = "buzzer.rejected")]
    BuzzerRejected {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rank: Option<u32>,
    },
    #[serde(rename = "buzzer.status")]
    BuzzerStatus { locked: bool, queue: Vec<BuzzQueueEntry> },
    #[serde(rename = "buzzer.cleared")]
    BuzzerCleared,
    #[serde(rename = "score.status")]
    ScoreStatus { scores: Vec<TeamScore> },
    #[serde(rename = "timer.tick")]
    TimerTick { remaining_ms: i64 },
    #[serde(rename = "display.approved")]
    DisplayApproved { display_id: String, role: DisplayRole },
    #[serde(rename = "display.status")]
    DisplayStatus { display: DisplayRecord },
    #[serde(rename = "webrtc.offer")]
    WebrtcOffer { from: String, sdp: String },
    #[serde(rename = "webrtc.answer")]
    WebrtcAnswer { from: String, sdp: String },
    #[serde(rename = "webrtc.ice")]
    WebrtcIce { from: String, candidate: String },
    #[serde(rename = "presenter.started")]
    PresenterStarted { presenter: String },
    #[serde(rename = "presenter.stopped")]
    PresenterStopped { presenter: String },
    #[serde(rename = "presenter.heartbeat")]
    PresenterHeartbeat { presenter: String },
}
