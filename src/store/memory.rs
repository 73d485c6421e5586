// Shared ordered store adapter.
//
// The hub keeps no authoritative state of its own: buzz queues, locks, timer
// state and the display registry all live behind this adapter. Each namespace
// sits under a single async mutex, which is what gives the Race Arbiter its
// compare-and-swap guarantee. Running more than one hub process requires
// swapping this adapter for a centralized service with the same atomicity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "store unavailable: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Ordering score of an ordered-set member.
///
/// `instant_us` is the submission instant; `seq` is a process-wide monotonic
/// counter that breaks ties when two inserts land in the same microsecond, so
/// member ordering is always strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score {
    pub instant_us: i64,
    seq: u64,
}

/// Result of a conditional ordered-set insert.
#[derive(Debug, Clone, Copy)]
pub struct InsertOutcome {
    /// False when the member already existed and nothing was written.
    pub inserted: bool,
    /// 1-based order statistic over the set (1 = earliest member).
    pub rank: u32,
    pub score: Score,
}

struct ExpiringValue {
    value: String,
    expires_at: Option<Instant>,
}

impl ExpiringValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-process implementation of the store contract.
pub struct SharedStore {
    zsets: Mutex<HashMap<String, HashMap<String, Score>>>,
    strings: Mutex<HashMap<String, ExpiringValue>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    seq: AtomicU64,
}

impl SharedStore {
    pub fn new() -> Self {
        Self {
            zsets: Mutex::new(HashMap::new()),
            strings: Mutex::new(HashMap::new()),
            hashes: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn next_score(&self) -> Score {
        Score {
            instant_us: Utc::now().timestamp_micros(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Conditionally insert `member` into the ordered set at `key`.
    ///
    /// The insert only happens when the member is absent; in both cases the
    /// returned rank is 1 + the number of members with a strictly earlier
    /// score. Check-and-insert happens under one lock, so concurrent callers
    /// can never observe the same rank for different members.
    pub async fn zadd_nx(&self, key: &str, member: &str) -> Result<InsertOutcome, StoreError> {
        let mut zsets = self.zsets.lock().await;
        let set = zsets.entry(key.to_string()).or_default();

        if let Some(existing) = set.get(member).copied() {
            let rank = rank_of(set, existing);
            return Ok(InsertOutcome { inserted: false, rank, score: existing });
        }

        let score = self.next_score();
        set.insert(member.to_string(), score);
        let rank = rank_of(set, score);
        Ok(InsertOutcome { inserted: true, rank, score })
    }

    /// All members of the ordered set at `key`, earliest first.
    pub async fn zrange(&self, key: &str) -> Result<Vec<(String, Score)>, StoreError> {
        let zsets = self.zsets.lock().await;
        let mut members: Vec<(String, Score)> = zsets
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by_key(|(_, score)| *score);
        Ok(members)
    }

    pub async fn zdel(&self, key: &str) -> Result<(), StoreError> {
        self.zsets.lock().await.remove(key);
        Ok(())
    }

    /// Set `key` only if absent (or expired). Returns true when the key was set.
    pub async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut strings = self.strings.lock().await;
        if let Some(existing) = strings.get(key) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        strings.insert(
            key.to_string(),
            ExpiringValue { value: value.to_string(), expires_at: ttl.map(|t| now + t) },
        );
        Ok(true)
    }

    /// Unconditionally set `key`.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        self.strings.lock().await.insert(
            key.to_string(),
            ExpiringValue { value: value.to_string(), expires_at: ttl.map(|t| now + t) },
        );
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut strings = self.strings.lock().await;
        match strings.get(key) {
            Some(existing) if existing.is_expired(now) => {
                strings.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut strings = self.strings.lock().await;
        match strings.get(key) {
            Some(existing) if existing.is_expired(now) => {
                strings.remove(key);
                Ok(None)
            }
            Some(existing) => Ok(Some(existing.value.clone())),
            None => Ok(None),
        }
    }

    pub async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.strings.lock().await.remove(key);
        Ok(())
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut hashes = self.hashes.lock().await;
        hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    pub async fn hset_all(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut hashes = self.hashes.lock().await;
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field, value);
        }
        Ok(())
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let hashes = self.hashes.lock().await;
        Ok(hashes.get(key).and_then(|hash| hash.get(field).cloned()))
    }

    pub async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let hashes = self.hashes.lock().await;
        Ok(hashes.get(key).cloned().unwrap_or_default())
    }

    pub async fn hdel_all(&self, key: &str) -> Result<(), StoreError> {
        self.hashes.lock().await.remove(key);
        Ok(())
    }

    /// Publish `payload` on `channel`. Returns the number of live subscribers.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        let mut channels = self.channels.lock().await;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        // Err means no subscribers, which is fine for a pub/sub channel.
        Ok(sender.send(payload.to_string()).unwrap_or(0))
    }

    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

fn rank_of(set: &HashMap<String, Score>, score: Score) -> u32 {
    1 + set.values().filter(|s| **s < score).count() as u32
}
