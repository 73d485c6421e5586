use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::buzzer::RaceArbiter;
use crate::services::displays::DisplayRegistry;
use crate::services::timer::TimerEngine;
use crate::store::SharedStore;
use crate::ws::registry::ConnectionRegistry;

/// Shared application state: the store adapter plus the services built on it.
/// Handlers and background tasks receive this as an injected capability
/// instead of reaching into globals.
pub struct AppState {
    pub store: Arc<SharedStore>,
    pub arbiter: RaceArbiter,
    pub timers: Arc<TimerEngine>,
    pub displays: DisplayRegistry,
    pub registry: ConnectionRegistry,
    pub heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(config: &Config) -> Arc<Self> {
        let store = Arc::new(SharedStore::new());
        Arc::new(Self {
            arbiter: RaceArbiter::new(
                Arc::clone(&store),
                Duration::from_millis(config.buzz_cooldown_ms),
            ),
            timers: Arc::new(TimerEngine::new(
                Arc::clone(&store),
                Duration::from_millis(config.timer_tick_ms),
            )),
            displays: DisplayRegistry::new(Arc::clone(&store), config.protected_display_min),
            registry: ConnectionRegistry::new(),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            store,
        })
    }
}
