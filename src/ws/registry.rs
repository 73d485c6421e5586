// Connection registry: the session manager owning all live connections and
// the session-scoped background tasks.
//
// Task lifecycle is tied 1:1 to connection-count transitions: the first
// connection of a session spawns its timer-tick relay and heartbeat tasks,
// the last disconnection aborts them. Cancellation is always routed through
// this owner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Event, Role};
use crate::state::AppState;
use crate::ws::tasks;

pub type ConnectionId = Uuid;
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Optional identity a connection is bound to at admission time.
#[derive(Debug, Clone)]
pub enum Binding {
    None,
    Team(i64),
    Display(String),
}

struct ConnectionHandle {
    role: Role,
    binding: Binding,
    sender: OutboundSender,
}

struct SessionGroup {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionGroup {
    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<i64, SessionGroup>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// Admit a connection into a session's role group. The first connection
    /// of a session spawns the session-scoped background tasks.
    pub async fn register(
        &self,
        state: &Arc<AppState>,
        session_id: i64,
        role: Role,
        binding: Binding,
        sender: OutboundSender,
    ) -> ConnectionId {
        let conn_id = Uuid::new_v4();
        let mut sessions = self.sessions.lock().await;
        let group = sessions.entry(session_id).or_insert_with(|| {
            info!("session {}: first connection, spawning session tasks", session_id);
            SessionGroup {
                connections: HashMap::new(),
                tasks: vec![
                    tokio::spawn(tasks::timer_relay(Arc::clone(state), session_id)),
                    tokio::spawn(tasks::heartbeat(Arc::clone(state), session_id)),
                ],
            }
        });
        group.connections.insert(conn_id, ConnectionHandle { role, binding, sender });
        debug!("session {}: registered {} connection {}", session_id, role.as_str(), conn_id);
        conn_id
    }

    /// Remove a connection. When no connections remain for the session in any
    /// role, all session-scoped background tasks are aborted.
    pub async fn unregister(&self, session_id: i64, conn_id: ConnectionId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(group) = sessions.get_mut(&session_id) {
            group.connections.remove(&conn_id);
            if group.connections.is_empty() {
                info!("session {}: last connection gone, cancelling session tasks", session_id);
                group.abort_tasks();
                sessions.remove(&session_id);
            }
        }
    }

    /// Fan a message out to every live connection in the given role, or to
    /// all roles when none is given. Delivery is best-effort: a failed send
    /// silently unregisters that connection.
    pub async fn broadcast(&self, session_id: i64, event: &Event, role: Option<Role>) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("session {}: failed to serialize event: {}", session_id, e);
                return;
            }
        };

        let mut sessions = self.sessions.lock().await;
        let Some(group) = sessions.get_mut(&session_id) else {
            return;
        };

        let mut dead = Vec::new();
        for (conn_id, handle) in group.connections.iter() {
            if role.map(|r| r == handle.role).unwrap_or(true)
                && handle.sender.send(payload.clone()).is_err()
            {
                dead.push(*conn_id);
            }
        }

        for conn_id in dead {
            debug!("session {}: dropping dead connection {}", session_id, conn_id);
            group.connections.remove(&conn_id);
        }
        if group.connections.is_empty() {
            info!("session {}: last connection gone, cancelling session tasks", session_id);
            group.abort_tasks();
            sessions.remove(&session_id);
        }
    }

    /// Team ids of currently connected contestants, used to bound score
    /// heartbeats to online teams.
    pub async fn online_team_ids(&self, session_id: i64) -> HashSet<i64> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&session_id)
            .map(|group| {
                group
                    .connections
                    .values()
                    .filter(|handle| handle.role == Role::Contestant)
                    .filter_map(|handle| match handle.binding {
                        Binding::Team(team_id) => Some(team_id),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.sessions.lock().await.values().map(|group| group.connections.len()).sum()
    }

    /// Number of background tasks owned by a session's group.
    #[cfg(test)]
    pub async fn session_task_count(&self, session_id: i64) -> usize {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|group| group.tasks.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::Binding;
    use crate::config::Config;
    use crate::models::{Event, Role};
    use crate::state::AppState;

    fn state() -> Arc<AppState> {
        AppState::new(&Config::default())
    }

    #[tokio::test(start_paused = true)]
    async fn session_tasks_follow_first_and_last_connection() {
        let state = state();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        let a = state.registry.register(&state, 1, Role::Moderator, Binding::None, tx_a).await;
        assert_eq!(state.registry.session_task_count(1).await, 2);

        // A second connection must not spawn duplicate relay tasks.
        let b = state.registry.register(&state, 1, Role::Display, Binding::None, tx_b).await;
        assert_eq!(state.registry.session_task_count(1).await, 2);
        assert_eq!(state.registry.connection_count().await, 2);

        state.registry.unregister(1, a).await;
        assert_eq!(state.registry.session_task_count(1).await, 2);

        state.registry.unregister(1, b).await;
        assert_eq!(state.registry.session_task_count(1).await, 0);
        assert_eq!(state.registry.session_count().await, 0);

        // The next connection recreates the tasks exactly once.
        let (tx_c, _rx_c) = mpsc::unbounded_channel();
        let c = state.registry.register(&state, 1, Role::Contestant, Binding::Team(7), tx_c).await;
        assert_eq!(state.registry.session_task_count(1).await, 2);
        state.registry.unregister(1, c).await;
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_is_scoped_to_the_requested_role() {
        let state = state();
        let (tx_mod, mut rx_mod) = mpsc::unbounded_channel();
        let (tx_disp, mut rx_disp) = mpsc::unbounded_channel();
        state.registry.register(&state, 1, Role::Moderator, Binding::None, tx_mod).await;
        state.registry.register(&state, 1, Role::Display, Binding::None, tx_disp).await;

        state
            .registry
            .broadcast(1, &Event::TimerTick { remaining_ms: 1500 }, Some(Role::Display))
            .await;
        assert!(rx_disp.try_recv().is_ok());
        assert!(rx_mod.try_recv().is_err());

        state.registry.broadcast(1, &Event::BuzzerCleared, None).await;
        assert!(rx_disp.try_recv().is_ok());
        assert!(rx_mod.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_silently_unregisters_the_connection() {
        let state = state();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        state.registry.register(&state, 1, Role::Display, Binding::None, tx_dead).await;
        state.registry.register(&state, 1, Role::Display, Binding::None, tx_live).await;
        drop(rx_dead);

        state.registry.broadcast(1, &Event::BuzzerCleared, None).await;
        assert!(rx_live.try_recv().is_ok());
        assert_eq!(state.registry.connection_count().await, 1);

        // When the dead connection was the last one, the session winds down.
        drop(rx_live);
        state.registry.broadcast(1, &Event::BuzzerCleared, None).await;
        assert_eq!(state.registry.session_count().await, 0);
        assert_eq!(state.registry.session_task_count(1).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn online_team_ids_only_counts_contestant_bindings() {
        let state = state();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let (tx_c, _rx_c) = mpsc::unbounded_channel();
        state.registry.register(&state, 1, Role::Contestant, Binding::Team(10), tx_a).await;
        state.registry.register(&state, 1, Role::Contestant, Binding::Team(20), tx_b).await;
        state
            .registry
            .register(&state, 1, Role::Display, Binding::Display("d1".to_string()), tx_c)
            .await;

        let teams = state.registry.online_team_ids(1).await;
        assert_eq!(teams.len(), 2);
        assert!(teams.contains(&10) && teams.contains(&20));
        assert!(state.registry.online_team_ids(2).await.is_empty());
    }
}
