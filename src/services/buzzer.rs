// Race arbiter: turns concurrent buzz submissions into a strict, gap-free
// ranking per session, backed by the shared store's conditional ordered
// insert.
//
// Lock semantics (one policy, single source of truth): the moderator lock is
// explicit and has no TTL; separately, every accepted buzz acquires a short
// auto-expiring cooldown lock so the moderator never has to manually unlock
// after each question.

use std::sync::Arc;
use std::time::Duration;

use crate::models::BuzzQueueEntry;
use crate::store::{SharedStore, StoreError};

fn queue_key(session_id: i64) -> String {
    format!("buzzer:{}", session_id)
}

fn lock_key(session_id: i64) -> String {
    format!("buzzer:lock:{}", session_id)
}

fn cooldown_key(session_id: i64) -> String {
    format!("buzzer:cooldown:{}", session_id)
}

fn first_key(session_id: i64) -> String {
    format!("buzzer:first:{}", session_id)
}

fn member(team_id: i64, device_id: &str) -> String {
    format!("{}:{}", team_id, device_id)
}

/// Why a buzz submission was not accepted. Returned as a value, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzRejection {
    /// The moderator lock is held for this session.
    Locked,
    /// The post-buzz cooldown lock has not expired yet.
    CoolingDown,
    /// This (team, device) already buzzed in the open window; carries the
    /// rank assigned on the original submission.
    Duplicate { rank: u32 },
}

impl BuzzRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            BuzzRejection::Locked => "locked",
            BuzzRejection::CoolingDown => "cooling_down",
            BuzzRejection::Duplicate { .. } => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BuzzOutcome {
    Accepted { rank: u32, is_first: bool, instant_us: i64 },
    Rejected(BuzzRejection),
}

pub struct RaceArbiter {
    store: Arc<SharedStore>,
    cooldown: Duration,
}

impl RaceArbiter {
    pub fn new(store: Arc<SharedStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    /// Submit a buzz for (team, device) in a session.
    ///
    /// Rank is 1 + the number of entries with a strictly earlier submission
    /// instant; the store's atomic insert makes ties impossible.
    pub async fn submit(
        &self,
        session_id: i64,
        team_id: i64,
        device_id: &str,
    ) -> Result<BuzzOutcome, StoreError> {
        if self.store.exists(&lock_key(session_id)).await? {
            return Ok(BuzzOutcome::Rejected(BuzzRejection::Locked));
        }
        if self.store.exists(&cooldown_key(session_id)).await? {
            return Ok(BuzzOutcome::Rejected(BuzzRejection::CoolingDown));
        }

        let outcome =
            self.store.zadd_nx(&queue_key(session_id), &member(team_id, device_id)).await?;
        if !outcome.inserted {
            return Ok(BuzzOutcome::Rejected(BuzzRejection::Duplicate { rank: outcome.rank }));
        }

        let is_first = self
            .store
            .set_nx(&first_key(session_id), &member(team_id, device_id), None)
            .await?;

        // Cooldown expires on its own; no moderator follow-up required.
        self.store.set(&cooldown_key(session_id), "1", Some(self.cooldown)).await?;

        Ok(BuzzOutcome::Accepted { rank: outcome.rank, is_first, instant_us: outcome.score.instant_us })
    }

    /// Current buzz queue, earliest submission first.
    pub async fn queue(&self, session_id: i64) -> Result<Vec<BuzzQueueEntry>, StoreError> {
        let members = self.store.zrange(&queue_key(session_id)).await?;
        let mut entries = Vec::with_capacity(members.len());
        for (rank, (member, score)) in members.into_iter().enumerate() {
            let (team, device) = match member.split_once(':') {
                Some(parts) => parts,
                None => continue,
            };
            let team_id = match team.parse::<i64>() {
                Ok(id) => id,
                Err(_) => continue,
            };
            entries.push(BuzzQueueEntry {
                team_id,
                device_id: device.to_string(),
                rank: rank as u32 + 1,
                instant_us: score.instant_us,
            });
        }
        Ok(entries)
    }

    pub async fn is_locked(&self, session_id: i64) -> Result<bool, StoreError> {
        self.store.exists(&lock_key(session_id)).await
    }

    /// The `team:device` member that buzzed first in the open window, if any.
    pub async fn first(&self, session_id: i64) -> Result<Option<String>, StoreError> {
        self.store.get(&first_key(session_id)).await
    }

    /// Hold the moderator lock; every submission is rejected until unlock.
    pub async fn lock(&self, session_id: i64) -> Result<(), StoreError> {
        self.store.set(&lock_key(session_id), "1", None).await
    }

    /// Release the moderator lock and clear the queue, the cooldown lock and
    /// the first-buzzer marker, opening a fresh buzz window.
    pub async fn unlock(&self, session_id: i64) -> Result<(), StoreError> {
        self.store.del(&lock_key(session_id)).await?;
        self.store.del(&cooldown_key(session_id)).await?;
        self.store.del(&first_key(session_id)).await?;
        self.store.zdel(&queue_key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{BuzzOutcome, BuzzRejection, RaceArbiter};
    use crate::store::SharedStore;

    fn arbiter_with_cooldown(cooldown_ms: u64) -> RaceArbiter {
        RaceArbiter::new(Arc::new(SharedStore::new()), Duration::from_millis(cooldown_ms))
    }

    async fn expect_accepted(arbiter: &RaceArbiter, session: i64, team: i64, device: &str) -> u32 {
        match arbiter.submit(session, team, device).await.expect("submit should succeed") {
            BuzzOutcome::Accepted { rank, .. } => rank,
            BuzzOutcome::Rejected(r) => panic!("expected accepted, got {:?}", r),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ranks_are_unique_and_increase_with_submission_order() {
        let arbiter = arbiter_with_cooldown(0);

        let mut ranks = Vec::new();
        for team in 1..=4 {
            ranks.push(expect_accepted(&arbiter, 1, team, "pad").await);
        }
        assert_eq!(ranks, vec![1, 2, 3, 4]);

        let queue = arbiter.queue(1).await.expect("queue should succeed");
        assert_eq!(queue.len(), 4);
        for window in queue.windows(2) {
            assert!(window[0].instant_us <= window[1].instant_us);
            assert_eq!(window[0].rank + 1, window[1].rank);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_submission_returns_original_rank() {
        let arbiter = arbiter_with_cooldown(0);

        assert_eq!(expect_accepted(&arbiter, 1, 10, "pad-a").await, 1);
        assert_eq!(expect_accepted(&arbiter, 1, 20, "pad-b").await, 2);

        match arbiter.submit(1, 10, "pad-a").await.expect("submit should succeed") {
            BuzzOutcome::Rejected(BuzzRejection::Duplicate { rank }) => assert_eq!(rank, 1),
            other => panic!("expected duplicate rejection, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn locked_session_rejects_until_unlocked_then_queue_restarts_at_rank_one() {
        let arbiter = arbiter_with_cooldown(0);

        expect_accepted(&arbiter, 1, 10, "pad").await;
        arbiter.lock(1).await.expect("lock should succeed");

        match arbiter.submit(1, 30, "pad").await.expect("submit should succeed") {
            BuzzOutcome::Rejected(BuzzRejection::Locked) => {}
            other => panic!("expected locked rejection, got {:?}", other),
        }

        arbiter.unlock(1).await.expect("unlock should succeed");
        assert!(arbiter.queue(1).await.expect("queue should succeed").is_empty());
        assert_eq!(expect_accepted(&arbiter, 1, 30, "pad").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_buzz_starts_cooldown_that_expires_on_its_own() {
        let arbiter = arbiter_with_cooldown(500);

        expect_accepted(&arbiter, 1, 10, "pad").await;

        match arbiter.submit(1, 20, "pad").await.expect("submit should succeed") {
            BuzzOutcome::Rejected(BuzzRejection::CoolingDown) => {}
            other => panic!("expected cooldown rejection, got {:?}", other),
        }

        tokio::time::advance(Duration::from_millis(501)).await;
        assert_eq!(expect_accepted(&arbiter, 1, 20, "pad").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_marker_is_set_exactly_once_per_window() {
        let arbiter = arbiter_with_cooldown(0);

        let first = arbiter.submit(1, 10, "pad").await.expect("submit should succeed");
        let second = arbiter.submit(1, 20, "pad").await.expect("submit should succeed");
        match (first, second) {
            (
                BuzzOutcome::Accepted { is_first: true, .. },
                BuzzOutcome::Accepted { is_first: false, .. },
            ) => {}
            other => panic!("expected first/second acceptance, got {:?}", other),
        }

        assert_eq!(
            arbiter.first(1).await.expect("first should succeed").as_deref(),
            Some("10:pad")
        );

        // A fresh window after unlock gets a fresh first marker.
        arbiter.unlock(1).await.expect("unlock should succeed");
        assert!(arbiter.first(1).await.expect("first should succeed").is_none());
        match arbiter.submit(1, 20, "pad").await.expect("submit should succeed") {
            BuzzOutcome::Accepted { is_first: true, rank: 1, .. } => {}
            other => panic!("expected first acceptance, got {:?}", other),
        }
        assert_eq!(
            arbiter.first(1).await.expect("first should succeed").as_deref(),
            Some("20:pad")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_isolated() {
        let arbiter = arbiter_with_cooldown(0);

        assert_eq!(expect_accepted(&arbiter, 1, 10, "pad").await, 1);
        assert_eq!(expect_accepted(&arbiter, 2, 10, "pad").await, 1);

        arbiter.lock(1).await.expect("lock should succeed");
        assert_eq!(expect_accepted(&arbiter, 2, 20, "pad").await, 2);
    }
}
