// Timer engine: one countdown state machine per session, stored in the shared
// store, with a background task publishing remaining time on the session's
// tick channel at a fixed cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{TimerPhase, TimerState};
use crate::store::{SharedStore, StoreError};

fn timer_key(session_id: i64) -> String {
    format!("timer:{}", session_id)
}

pub fn tick_channel(session_id: i64) -> String {
    format!("timer:tick:{}", session_id)
}

pub struct TimerEngine {
    store: Arc<SharedStore>,
    tick_interval: Duration,
    running: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl TimerEngine {
    pub fn new(store: Arc<SharedStore>, tick_interval: Duration) -> Self {
        Self { store, tick_interval, running: Mutex::new(HashMap::new()) }
    }

    /// Start a countdown, cancelling any countdown already running for the
    /// session.
    pub async fn start(self: &Arc<Self>, session_id: i64, duration_ms: i64) -> Result<(), StoreError> {
        let mut fields = HashMap::new();
        fields.insert("phase".to_string(), TimerPhase::Counting.as_str().to_string());
        fields.insert("started_at".to_string(), Utc::now().timestamp_millis().to_string());
        fields.insert("duration_ms".to_string(), duration_ms.to_string());
        fields.insert("remaining_ms".to_string(), duration_ms.to_string());
        self.store.hset_all(&timer_key(session_id), fields).await?;

        self.spawn_countdown(session_id, duration_ms).await;
        Ok(())
    }

    /// Pause a running countdown, freezing remaining at its last computed
    /// value. Returns false when no countdown was active.
    pub async fn pause(&self, session_id: i64) -> Result<bool, StoreError> {
        let state = self.state(session_id).await?;
        match state {
            Some(state) if state.phase == TimerPhase::Counting => {}
            _ => return Ok(false),
        }

        if let Some(handle) = self.running.lock().await.remove(&session_id) {
            handle.abort();
        }
        // The countdown may have expired between the read and the abort; an
        // already-stopped timer must stay stopped.
        match self.state(session_id).await? {
            Some(state) if state.phase == TimerPhase::Counting => {}
            _ => return Ok(false),
        }
        self.store
            .hset(&timer_key(session_id), "phase", TimerPhase::Paused.as_str())
            .await?;
        Ok(true)
    }

    /// Resume a paused countdown with the frozen remaining time as the new
    /// duration. Returns false when the timer is not paused or has no time
    /// left.
    pub async fn resume(self: &Arc<Self>, session_id: i64) -> Result<bool, StoreError> {
        let state = self.state(session_id).await?;
        let remaining_ms = match state {
            Some(state) if state.phase == TimerPhase::Paused => state.remaining_ms,
            _ => return Ok(false),
        };
        if remaining_ms <= 0 {
            return Ok(false);
        }

        self.store
            .hset(&timer_key(session_id), "phase", TimerPhase::Counting.as_str())
            .await?;
        self.spawn_countdown(session_id, remaining_ms).await;
        Ok(true)
    }

    /// Cancel any countdown and clear all timer state unconditionally.
    pub async fn reset(&self, session_id: i64) -> Result<(), StoreError> {
        if let Some(handle) = self.running.lock().await.remove(&session_id) {
            handle.abort();
        }
        self.store.hdel_all(&timer_key(session_id)).await
    }

    /// Current timer state, if any.
    pub async fn state(&self, session_id: i64) -> Result<Option<TimerState>, StoreError> {
        let fields = self.store.hget_all(&timer_key(session_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let phase = fields
            .get("phase")
            .and_then(|p| TimerPhase::parse(p))
            .unwrap_or(TimerPhase::Idle);
        let parse_i64 =
            |field: &str| fields.get(field).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        Ok(Some(TimerState {
            phase,
            duration_ms: parse_i64("duration_ms"),
            remaining_ms: parse_i64("remaining_ms"),
            started_at: parse_i64("started_at"),
        }))
    }

    /// Number of countdown tasks currently running, for diagnostics.
    pub async fn running_count(&self) -> usize {
        let mut running = self.running.lock().await;
        running.retain(|_, handle| !handle.is_finished());
        running.len()
    }

    async fn spawn_countdown(self: &Arc<Self>, session_id: i64, duration_ms: i64) {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.remove(&session_id) {
            previous.abort();
        }
        let engine = Arc::clone(self);
        running.insert(
            session_id,
            tokio::spawn(async move {
                engine.countdown(session_id, duration_ms).await;
            }),
        );
    }

    async fn countdown(&self, session_id: i64, duration_ms: i64) {
        let key = timer_key(session_id);
        let channel = tick_channel(session_id);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(duration_ms.max(0) as u64);
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let remaining_ms =
                deadline.saturating_duration_since(tokio::time::Instant::now()).as_millis() as i64;

            if remaining_ms <= 0 {
                // Terminal zero tick, then the task exits.
                if let Err(e) = self.store.hset(&key, "phase", TimerPhase::Stopped.as_str()).await {
                    warn!("timer {}: failed to store stopped phase: {}", session_id, e);
                }
                if let Err(e) = self.store.hset(&key, "remaining_ms", "0").await {
                    warn!("timer {}: failed to store final remaining: {}", session_id, e);
                }
                if let Err(e) = self.store.publish(&channel, "0").await {
                    warn!("timer {}: failed to publish final tick: {}", session_id, e);
                }
                debug!("timer {}: countdown finished", session_id);
                return;
            }

            // A failed store write or publish skips this tick; the countdown
            // itself keeps going.
            if let Err(e) = self.store.hset(&key, "remaining_ms", &remaining_ms.to_string()).await {
                warn!("timer {}: failed to store remaining: {}", session_id, e);
                continue;
            }
            if let Err(e) = self.store.publish(&channel, &remaining_ms.to_string()).await {
                warn!("timer {}: failed to publish tick: {}", session_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{tick_channel, TimerEngine};
    use crate::models::TimerPhase;
    use crate::store::SharedStore;

    fn engine() -> (Arc<SharedStore>, Arc<TimerEngine>) {
        let store = Arc::new(SharedStore::new());
        let engine = Arc::new(TimerEngine::new(Arc::clone(&store), Duration::from_millis(100)));
        (store, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaches_stopped_with_exactly_one_terminal_zero_tick() {
        let (store, engine) = engine();
        let mut ticks = store.subscribe(&tick_channel(1)).await;

        engine.start(1, 300).await.expect("start should succeed");
        tokio::time::sleep(Duration::from_millis(450)).await;

        let mut zero_ticks = 0;
        let mut last = i64::MAX;
        while let Ok(tick) = ticks.try_recv() {
            let remaining: i64 = tick.parse().expect("tick should be numeric");
            assert!(remaining <= last, "ticks must be monotonically decreasing");
            last = remaining;
            if remaining == 0 {
                zero_ticks += 1;
            }
        }
        assert_eq!(zero_ticks, 1);

        let state = engine.state(1).await.expect("state should succeed").expect("state should exist");
        assert_eq!(state.phase, TimerPhase::Stopped);
        assert_eq!(state.remaining_ms, 0);
        assert_eq!(engine.running_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_remaining_and_resume_continues_from_it() {
        let (_store, engine) = engine();

        engine.start(1, 1000).await.expect("start should succeed");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(engine.pause(1).await.expect("pause should succeed"));
        let paused = engine.state(1).await.expect("state should succeed").expect("state should exist");
        assert_eq!(paused.phase, TimerPhase::Paused);
        assert!(paused.remaining_ms > 0);
        assert!((paused.remaining_ms - 600).abs() <= 100, "remaining was {}", paused.remaining_ms);

        // Frozen while paused.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let still = engine.state(1).await.expect("state should succeed").expect("state should exist");
        assert_eq!(still.remaining_ms, paused.remaining_ms);

        assert!(engine.resume(1).await.expect("resume should succeed"));
        tokio::time::sleep(Duration::from_millis(paused.remaining_ms as u64 + 200)).await;
        let done = engine.state(1).await.expect("state should succeed").expect("state should exist");
        assert_eq!(done.phase, TimerPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_without_active_countdown_returns_false() {
        let (_store, engine) = engine();
        assert!(!engine.pause(1).await.expect("pause should succeed"));

        engine.start(1, 200).await.expect("start should succeed");
        tokio::time::sleep(Duration::from_millis(400)).await;
        // Already stopped by expiry.
        assert!(!engine.pause(1).await.expect("pause should succeed"));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_never_resurrects_a_stopped_countdown() {
        let (_store, engine) = engine();

        engine.start(1, 200).await.expect("start should succeed");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!engine.pause(1).await.expect("pause should succeed"));

        let state = engine.state(1).await.expect("state should succeed").expect("state should exist");
        assert_eq!(state.phase, TimerPhase::Stopped);
        assert_eq!(state.remaining_ms, 0);
        assert!(!engine.resume(1).await.expect("resume should succeed"));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_is_only_valid_from_paused() {
        let (_store, engine) = engine();
        assert!(!engine.resume(1).await.expect("resume should succeed"));

        engine.start(1, 1000).await.expect("start should succeed");
        assert!(!engine.resume(1).await.expect("resume should succeed"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_state_regardless_of_phase() {
        let (_store, engine) = engine();

        engine.start(1, 1000).await.expect("start should succeed");
        tokio::time::sleep(Duration::from_millis(150)).await;
        engine.reset(1).await.expect("reset should succeed");

        assert!(engine.state(1).await.expect("state should succeed").is_none());
        assert_eq!(engine.running_count().await, 0);

        // Resetting an idle session is fine too.
        engine.reset(2).await.expect("reset should succeed");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_running_countdown() {
        let (store, engine) = engine();

        engine.start(1, 10_000).await.expect("start should succeed");
        tokio::time::sleep(Duration::from_millis(250)).await;
        engine.start(1, 500).await.expect("start should succeed");

        let mut ticks = store.subscribe(&tick_channel(1)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        let tick: i64 = ticks
            .recv()
            .await
            .expect("tick should arrive")
            .parse()
            .expect("tick should be numeric");
        assert!(tick <= 500, "tick {} should come from the new countdown", tick);
        assert_eq!(engine.running_count().await, 1);
    }
}
