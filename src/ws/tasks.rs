// Session-scoped background tasks. Both run for exactly the lifetime of a
// session's connection group and are aborted by the registry when the last
// connection leaves.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::db::scoredb;
use crate::models::Event;
use crate::services::timer;
use crate::state::AppState;

/// Forward timer ticks from the store channel to every connection of the
/// session.
pub async fn timer_relay(state: Arc<AppState>, session_id: i64) {
    let mut ticks = state.store.subscribe(&timer::tick_channel(session_id)).await;
    loop {
        match ticks.recv().await {
            Ok(tick) => {
                let remaining_ms = match tick.parse::<i64>() {
                    Ok(ms) => ms,
                    Err(_) => {
                        warn!("session {}: non-numeric timer tick {:?}", session_id, tick);
                        continue;
                    }
                };
                state
                    .registry
                    .broadcast(session_id, &Event::TimerTick { remaining_ms }, None)
                    .await;
            }
            Err(RecvError::Lagged(skipped)) => {
                // Ticks are periodic state, not a log; catching up is enough.
                debug!("session {}: timer relay lagged, skipped {} ticks", session_id, skipped);
            }
            Err(RecvError::Closed) => {
                ticks = state.store.subscribe(&timer::tick_channel(session_id)).await;
            }
        }
    }
}

/// Periodic presence heartbeat: buzzer status to everyone, plus score totals
/// for the teams currently online. A failed iteration is logged and skipped;
/// the heartbeat itself keeps running.
pub async fn heartbeat(state: Arc<AppState>, session_id: i64) {
    let mut ticker = tokio::time::interval(state.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match heartbeat_status(&state, session_id).await {
            Ok(event) => state.registry.broadcast(session_id, &event, None).await,
            Err(e) => warn!("session {}: heartbeat status failed: {}", session_id, e),
        }

        match state.displays.live_presenter(session_id).await {
            Ok(Some(presenter)) => {
                state
                    .registry
                    .broadcast(session_id, &Event::PresenterHeartbeat { presenter }, None)
                    .await
            }
            Ok(None) => {}
            Err(e) => warn!("session {}: presenter liveness check failed: {}", session_id, e),
        }

        let Some(db) = scoredb::get_db() else {
            continue;
        };
        let teams = state.registry.online_team_ids(session_id).await;
        if teams.is_empty() {
            continue;
        }
        match db.team_totals(session_id, &teams).await {
            Ok(scores) => {
                state.registry.broadcast(session_id, &Event::ScoreStatus { scores }, None).await
            }
            Err(e) => warn!("session {}: heartbeat score query failed: {}", session_id, e),
        }
    }
}

async fn heartbeat_status(
    state: &Arc<AppState>,
    session_id: i64,
) -> Result<Event, crate::store::StoreError> {
    let locked = state.arbiter.is_locked(session_id).await?;
    let queue = state.arbiter.queue(session_id).await?;
    Ok(Event::BuzzerStatus { locked, queue })
}
