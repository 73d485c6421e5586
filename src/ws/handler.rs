// WebSocket endpoint: admission, message dispatch and disconnect cleanup for
// one client connection.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::auth;
use crate::models::{
    BuzzMessage, ClientMessage, DisplayStatus, DisplayUpdate, Event, IceMessage, JoinMessage,
    Role, SdpMessage, StatusUpdateMessage,
};
use crate::services::auth_service::{self, SessionClaims};
use crate::services::buzzer::{BuzzOutcome, BuzzRejection};
use crate::state::AppState;
use crate::ws::registry::{Binding, OutboundSender};

const POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    #[serde(default)]
    pub display_id: Option<String>,
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path((session_id, role)): Path<(i64, String)>,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket, session_id, role, query))
}

async fn handle_socket(
    state: Arc<AppState>,
    mut socket: WebSocket,
    session_id: i64,
    role: String,
    query: WsQuery,
) {
    let (role, claims) = match admit(session_id, &role, query.token.as_deref()).await {
        Ok(admitted) => admitted,
        Err(reason) => {
            info!("ws session {}: connection refused: {}", session_id, reason);
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: POLICY_VIOLATION,
                    reason: reason.into(),
                })))
                .await;
            return;
        }
    };

    let mut conn = Connection::new(state, session_id, role, claims, query.display_id);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = conn
        .state
        .registry
        .register(&conn.state, session_id, role, conn.binding(), tx.clone())
        .await;
    conn.tx = Some(tx);
    info!("ws session {}: {} {} connected", session_id, role.as_str(), conn.claims.sub);

    conn.on_connect().await;

    let (mut sink, mut stream) = socket.split();
    let forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => conn.dispatch(message).await,
                Err(e) => {
                    // Anything outside the protocol is dropped, not fatal.
                    debug!("ws session {}: unparseable message: {}", session_id, e);
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    forward.abort();
    // Farewell broadcasts go out while the peers (and this connection's
    // session group) are still registered.
    conn.on_disconnect().await;
    conn.state.registry.unregister(session_id, conn_id).await;
    info!("ws session {}: {} {} disconnected", session_id, role.as_str(), conn.claims.sub);
}

/// Validate the token and check that it permits the requested role and
/// session.
async fn admit(
    session_id: i64,
    role: &str,
    token: Option<&str>,
) -> Result<(Role, SessionClaims), String> {
    let role = Role::parse(role).ok_or_else(|| format!("unknown role '{}'", role))?;
    let token = token.ok_or_else(|| "missing token".to_string())?;
    let claims = auth_service::validate_session_token(token).await?;

    if !auth::session_permitted(&claims, session_id) {
        return Err("token not valid for this session".to_string());
    }
    if !auth::role_permitted(&claims, role) {
        return Err(format!("token does not permit role '{}'", role.as_str()));
    }
    Ok((role, claims))
}

/// Per-connection dispatch state.
struct Connection {
    state: Arc<AppState>,
    session_id: i64,
    role: Role,
    claims: SessionClaims,
    display_id: Option<String>,
    tx: Option<OutboundSender>,
    presenting: bool,
}

impl Connection {
    fn new(
        state: Arc<AppState>,
        session_id: i64,
        role: Role,
        claims: SessionClaims,
        display_id: Option<String>,
    ) -> Self {
        Self { state, session_id, role, claims, display_id, tx: None, presenting: false }
    }

    fn binding(&self) -> Binding {
        match self.role {
            Role::Contestant => match self.claims.team_id {
                Some(team_id) => Binding::Team(team_id),
                None => Binding::None,
            },
            Role::Display => {
                Binding::Display(self.display_id.clone().unwrap_or_else(|| self.claims.sub.clone()))
            }
            _ => Binding::None,
        }
    }

    fn display_key(&self) -> String {
        self.display_id.clone().unwrap_or_else(|| self.claims.sub.clone())
    }

    /// Send an event to this connection only.
    fn send(&self, event: &Event) {
        let Some(tx) = &self.tx else { return };
        match serde_json::to_string(event) {
            Ok(payload) => {
                let _ = tx.send(payload);
            }
            Err(e) => warn!("ws session {}: failed to serialize event: {}", self.session_id, e),
        }
    }

    async fn on_connect(&mut self) {
        match self.role {
            Role::Display => {
                let update = DisplayUpdate {
                    status: Some(DisplayStatus::Connected),
                    ..Default::default()
                };
                match self
                    .state
                    .displays
                    .register_or_update(self.session_id, &self.display_key(), update)
                    .await
                {
                    Ok(display) => {
                        self.state
                            .registry
                            .broadcast(
                                self.session_id,
                                &Event::DisplayStatus { display },
                                Some(Role::Moderator),
                            )
                            .await;
                    }
                    Err(e) => {
                        warn!("ws session {}: display upsert failed: {}", self.session_id, e)
                    }
                }
            }
            Role::Presenter => self.try_start_presenting().await,
            _ => {}
        }
    }

    async fn on_disconnect(&mut self) {
        match self.role {
            Role::Display => {
                match self
                    .state
                    .displays
                    .set_status(self.session_id, &self.display_key(), DisplayStatus::Disconnected)
                    .await
                {
                    Ok(display) => {
                        self.state
                            .registry
                            .broadcast(
                                self.session_id,
                                &Event::DisplayStatus { display },
                                Some(Role::Moderator),
                            )
                            .await;
                    }
                    Err(e) => {
                        warn!("ws session {}: display status update failed: {}", self.session_id, e)
                    }
                }
            }
            Role::Presenter if self.presenting => {
                if let Err(e) = self.state.displays.clear_live_presenter(self.session_id).await {
                    warn!("ws session {}: presenter liveness clear failed: {}", self.session_id, e);
                }
                self.state
                    .registry
                    .broadcast(
                        self.session_id,
                        &Event::PresenterStopped { presenter: self.claims.sub.clone() },
                        None,
                    )
                    .await;
            }
            _ => {}
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) {
        match (self.role, message) {
            (Role::Display | Role::Presenter, ClientMessage::Join(join)) => {
                self.on_join(join).await
            }
            (Role::Contestant, ClientMessage::Buzz(buzz)) => self.on_buzz(buzz).await,
            (Role::Presenter, ClientMessage::Offer(offer)) => self.on_offer(offer).await,
            (Role::Display, ClientMessage::Answer(answer)) => self.on_answer(answer).await,
            (role, ClientMessage::IceCandidate(ice)) => self.on_ice(role, ice).await,
            (Role::Display | Role::Presenter, ClientMessage::StatusUpdate(update)) => {
                self.on_status_update(update).await
            }
            (role, message) => {
                debug!(
                    "ws session {}: {} sent message not valid for its role: {:?}",
                    self.session_id,
                    role.as_str(),
                    message
                );
            }
        }
    }

    async fn on_join(&mut self, join: JoinMessage) {
        if let Some(display_id) = join.display_id {
            self.display_id = Some(display_id);
        }
        let update = DisplayUpdate {
            status: Some(DisplayStatus::Connected),
            name: join.name,
            ..Default::default()
        };
        match self
            .state
            .displays
            .register_or_update(self.session_id, &self.display_key(), update)
            .await
        {
            Ok(display) => {
                self.state
                    .registry
                    .broadcast(
                        self.session_id,
                        &Event::DisplayStatus { display },
                        Some(Role::Moderator),
                    )
                    .await;
            }
            Err(e) => warn!("ws session {}: display join failed: {}", self.session_id, e),
        }
    }

    async fn on_buzz(&mut self, buzz: BuzzMessage) {
        // A session token bound to a team always wins over the payload.
        let Some(team_id) = self.claims.team_id.or(buzz.team_id) else {
            self.send(&Event::BuzzerRejected { reason: "no_team".to_string(), rank: None });
            return;
        };

        match self.state.arbiter.submit(self.session_id, team_id, &buzz.device_id).await {
            Ok(BuzzOutcome::Accepted { rank, is_first, .. }) => {
                self.send(&Event::BuzzerAccepted { rank, is_first });
                self.state
                    .registry
                    .broadcast(
                        self.session_id,
                        &Event::BuzzerUpdate {
                            team_id,
                            device_id: buzz.device_id,
                            rank,
                            is_first,
                        },
                        None,
                    )
                    .await;
            }
            Ok(BuzzOutcome::Rejected(rejection)) => {
                let rank = match rejection {
                    BuzzRejection::Duplicate { rank } => Some(rank),
                    _ => None,
                };
                self.send(&Event::BuzzerRejected {
                    reason: rejection.reason().to_string(),
                    rank,
                });
            }
            Err(e) => {
                warn!("ws session {}: buzz submission failed: {}", self.session_id, e);
                self.send(&Event::BuzzerRejected { reason: "unavailable".to_string(), rank: None });
            }
        }
    }

    async fn on_offer(&mut self, offer: SdpMessage) {
        if !self.presenting {
            self.try_start_presenting().await;
            if !self.presenting {
                debug!(
                    "ws session {}: dropping offer, publishing gate not satisfied",
                    self.session_id
                );
                return;
            }
        }
        self.state
            .registry
            .broadcast(
                self.session_id,
                &Event::WebrtcOffer { from: self.claims.sub.clone(), sdp: offer.sdp },
                Some(Role::Display),
            )
            .await;
    }

    async fn on_answer(&mut self, answer: SdpMessage) {
        self.state
            .registry
            .broadcast(
                self.session_id,
                &Event::WebrtcAnswer { from: self.display_key(), sdp: answer.sdp },
                Some(Role::Presenter),
            )
            .await;
    }

    /// ICE candidates relay between the presenter and displays, in either
    /// direction.
    async fn on_ice(&mut self, role: Role, ice: IceMessage) {
        let target = match role {
            Role::Presenter => Role::Display,
            Role::Display => Role::Presenter,
            _ => {
                debug!("ws session {}: ice candidate from non-signaling role", self.session_id);
                return;
            }
        };
        let from = match role {
            Role::Display => self.display_key(),
            _ => self.claims.sub.clone(),
        };
        self.state
            .registry
            .broadcast(
                self.session_id,
                &Event::WebrtcIce { from, candidate: ice.candidate },
                Some(target),
            )
            .await;
    }

    async fn on_status_update(&mut self, update: StatusUpdateMessage) {
        let update = DisplayUpdate { metrics: Some(update.metrics), ..Default::default() };
        match self
            .state
            .displays
            .register_or_update(self.session_id, &self.display_key(), update)
            .await
        {
            Ok(display) => {
                self.state
                    .registry
                    .broadcast(
                        self.session_id,
                        &Event::DisplayStatus { display },
                        Some(Role::Moderator),
                    )
                    .await;
            }
            Err(e) => warn!("ws session {}: display metrics update failed: {}", self.session_id, e),
        }
    }

    /// The publishing gate: a presenter goes live only once enough protected
    /// displays are approved or connected.
    async fn try_start_presenting(&mut self) {
        match self.state.displays.publishing_allowed(self.session_id).await {
            Ok(true) => {
                self.presenting = true;
                if let Err(e) =
                    self.state.displays.set_live_presenter(self.session_id, &self.claims.sub).await
                {
                    warn!("ws session {}: presenter liveness write failed: {}", self.session_id, e);
                }
                self.state
                    .registry
                    .broadcast(
                        self.session_id,
                        &Event::PresenterStarted { presenter: self.claims.sub.clone() },
                        None,
                    )
                    .await;
            }
            Ok(false) => {
                debug!("ws session {}: presenter waiting on protected displays", self.session_id)
            }
            Err(e) => warn!("ws session {}: publishing gate check failed: {}", self.session_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::Connection;
    use crate::config::Config;
    use crate::models::{BuzzMessage, DisplayRole, JoinMessage, Role, SdpMessage};
    use crate::services::auth_service::SessionClaims;
    use crate::state::AppState;
    use crate::ws::registry::Binding;

    fn claims(role: Role, team_id: Option<i64>) -> SessionClaims {
        SessionClaims {
            sub: "user-1".to_string(),
            role,
            session_id: Some(1),
            team_id,
            exp: 0,
        }
    }

    fn connection(
        state: &Arc<AppState>,
        role: Role,
        team_id: Option<i64>,
        display_id: Option<&str>,
    ) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new(
            Arc::clone(state),
            1,
            role,
            claims(role, team_id),
            display_id.map(str::to_string),
        );
        conn.tx = Some(tx);
        (conn, rx)
    }

    /// Drain the receiver looking for an event with the given tag; heartbeat
    /// traffic may interleave with the event under test.
    fn find_event(rx: &mut mpsc::UnboundedReceiver<String>, tag: &str) -> Option<String> {
        let needle = format!(r#""event":"{}""#, tag);
        while let Ok(payload) = rx.try_recv() {
            if payload.contains(&needle) {
                return Some(payload);
            }
        }
        None
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_buzz_answers_the_buzzer_and_updates_everyone() {
        let state = AppState::new(&Config::default());
        let (mut conn, mut own_rx) = connection(&state, Role::Contestant, Some(7), None);
        let (mod_tx, mut mod_rx) = mpsc::unbounded_channel();
        let mod_id =
            state.registry.register(&state, 1, Role::Moderator, Binding::None, mod_tx).await;

        conn.on_buzz(BuzzMessage { team_id: None, device_id: "pad-1".to_string() }).await;

        let accepted =
            find_event(&mut own_rx, "buzzer.accepted").expect("buzzer should hear back");
        assert!(accepted.contains(r#""rank":1"#));
        assert!(accepted.contains(r#""is_first":true"#));

        let update =
            find_event(&mut mod_rx, "buzzer.update").expect("moderator should see the update");
        assert!(update.contains(r#""team_id":7"#));
        state.registry.unregister(1, mod_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_without_any_team_binding_is_rejected_locally() {
        let state = AppState::new(&Config::default());
        let (mut conn, mut rx) = connection(&state, Role::Contestant, None, None);

        conn.on_buzz(BuzzMessage { team_id: None, device_id: "pad-1".to_string() }).await;

        let rejected =
            find_event(&mut rx, "buzzer.rejected").expect("buzzer should hear back");
        assert!(rejected.contains(r#""reason":"no_team""#));
        assert!(state.arbiter.queue(1).await.expect("queue should succeed").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn token_team_binding_overrides_the_payload() {
        let state = AppState::new(&Config::default());
        let (mut conn, mut rx) = connection(&state, Role::Contestant, Some(7), None);

        conn.on_buzz(BuzzMessage { team_id: Some(99), device_id: "pad-1".to_string() }).await;
        assert!(find_event(&mut rx, "buzzer.accepted").is_some());

        let queue = state.arbiter.queue(1).await.expect("queue should succeed");
        assert_eq!(queue[0].team_id, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn display_join_updates_the_record_and_notifies_moderators() {
        let state = AppState::new(&Config::default());
        let (mut conn, _rx) = connection(&state, Role::Display, None, Some("stage-left"));
        let (mod_tx, mut mod_rx) = mpsc::unbounded_channel();
        let mod_id =
            state.registry.register(&state, 1, Role::Moderator, Binding::None, mod_tx).await;

        conn.on_join(JoinMessage { display_id: None, name: Some("Stage left".to_string()) }).await;

        let status =
            find_event(&mut mod_rx, "display.status").expect("moderator should see display status");
        assert!(status.contains(r#""display_id":"stage-left""#));
        assert!(status.contains(r#""status":"connected""#));
        state.registry.unregister(1, mod_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn presenter_offer_is_gated_until_protected_displays_are_online() {
        let state = AppState::new(&Config::default());
        let (mut presenter, _rx) = connection(&state, Role::Presenter, None, None);
        let (disp_tx, mut disp_rx) = mpsc::unbounded_channel();
        let disp_id = state
            .registry
            .register(&state, 1, Role::Display, Binding::Display("a".to_string()), disp_tx)
            .await;

        presenter.on_offer(SdpMessage { sdp: "v=0".to_string() }).await;
        assert!(
            find_event(&mut disp_rx, "webrtc.offer").is_none(),
            "offer must not relay before the gate opens"
        );

        // Two approved protected displays satisfy the default gate.
        for id in ["a", "b"] {
            state
                .displays
                .approve(1, id, DisplayRole::Protected, "mod-1")
                .await
                .expect("approve should succeed");
        }

        presenter.on_offer(SdpMessage { sdp: "v=0".to_string() }).await;
        assert!(find_event(&mut disp_rx, "presenter.started").is_some());
        let offer =
            find_event(&mut disp_rx, "webrtc.offer").expect("display should receive the offer");
        assert!(offer.contains(r#""from":"user-1""#));
        state.registry.unregister(1, disp_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn presenter_telemetry_lands_in_the_registry_like_a_display() {
        let state = AppState::new(&Config::default());
        let (mut presenter, _rx) = connection(&state, Role::Presenter, None, None);
        let (mod_tx, mut mod_rx) = mpsc::unbounded_channel();
        let mod_id =
            state.registry.register(&state, 1, Role::Moderator, Binding::None, mod_tx).await;

        presenter
            .dispatch(
                serde_json::from_str(
                    r#"{"type":"status-update","metrics":{"bitrate_kbps":3500}}"#,
                )
                .expect("status-update should parse"),
            )
            .await;

        let status =
            find_event(&mut mod_rx, "display.status").expect("moderator should see telemetry");
        assert!(status.contains(r#""display_id":"user-1""#));
        assert!(status.contains(r#""bitrate_kbps":3500"#));

        // Presenter join self-registers the same way.
        presenter
            .dispatch(
                serde_json::from_str(r#"{"type":"join","name":"Main presenter"}"#)
                    .expect("join should parse"),
            )
            .await;
        let records = state.displays.list(1).await.expect("list should succeed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("Main presenter"));
        state.registry.unregister(1, mod_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn display_answer_reaches_only_presenters() {
        let state = AppState::new(&Config::default());
        let (mut display, _rx) = connection(&state, Role::Display, None, Some("stage-left"));
        let (pres_tx, mut pres_rx) = mpsc::unbounded_channel();
        let (mod_tx, mut mod_rx) = mpsc::unbounded_channel();
        let a = state.registry.register(&state, 1, Role::Presenter, Binding::None, pres_tx).await;
        let b = state.registry.register(&state, 1, Role::Moderator, Binding::None, mod_tx).await;

        display.on_answer(SdpMessage { sdp: "v=0".to_string() }).await;

        let answer =
            find_event(&mut pres_rx, "webrtc.answer").expect("presenter should receive the answer");
        assert!(answer.contains(r#""from":"stage-left""#));
        assert!(find_event(&mut mod_rx, "webrtc.answer").is_none());
        state.registry.unregister(1, a).await;
        state.registry.unregister(1, b).await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cleanup_broadcasts_while_peers_are_still_registered() {
        let state = AppState::new(&Config::default());
        let (disp_tx, _disp_rx) = mpsc::unbounded_channel();
        let (mut display, _rx) = connection(&state, Role::Display, None, Some("stage-left"));
        let disp_id = state
            .registry
            .register(&state, 1, Role::Display, Binding::Display("stage-left".to_string()), disp_tx)
            .await;
        let (mod_tx, mut mod_rx) = mpsc::unbounded_channel();
        let mod_id =
            state.registry.register(&state, 1, Role::Moderator, Binding::None, mod_tx).await;

        display.on_disconnect().await;
        state.registry.unregister(1, disp_id).await;

        let status =
            find_event(&mut mod_rx, "display.status").expect("moderator should see the farewell");
        assert!(status.contains(r#""status":"disconnected""#));
        state.registry.unregister(1, mod_id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn presenter_disconnect_clears_liveness_and_broadcasts_stop() {
        let state = AppState::new(&Config::default());
        let (mut presenter, _rx) = connection(&state, Role::Presenter, None, None);
        let (mod_tx, mut mod_rx) = mpsc::unbounded_channel();
        let mod_id =
            state.registry.register(&state, 1, Role::Moderator, Binding::None, mod_tx).await;

        for id in ["a", "b"] {
            state
                .displays
                .approve(1, id, DisplayRole::Protected, "mod-1")
                .await
                .expect("approve should succeed");
        }
        presenter.try_start_presenting().await;
        assert_eq!(
            state.displays.live_presenter(1).await.expect("lookup should succeed").as_deref(),
            Some("user-1")
        );

        presenter.on_disconnect().await;
        assert!(state.displays.live_presenter(1).await.expect("lookup should succeed").is_none());
        let stopped = find_event(&mut mod_rx, "presenter.stopped")
            .expect("moderator should see the presenter stop");
        assert!(stopped.contains(r#""presenter":"user-1""#));
        state.registry.unregister(1, mod_id).await;
    }
}
