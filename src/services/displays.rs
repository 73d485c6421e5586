// Display registry: approval workflow and liveness tracking for auxiliary
// display endpoints, kept as merge-updated JSON records in the shared store.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::models::{DisplayRecord, DisplayRole, DisplayStatus, DisplayUpdate};
use crate::store::{SharedStore, StoreError};

fn registry_key(session_id: i64) -> String {
    format!("display:registry:{}", session_id)
}

fn presenter_key(session_id: i64) -> String {
    format!("presenter:{}", session_id)
}

pub struct DisplayRegistry {
    store: Arc<SharedStore>,
    protected_min: usize,
}

impl DisplayRegistry {
    pub fn new(store: Arc<SharedStore>, protected_min: usize) -> Self {
        Self { store, protected_min }
    }

    /// Merge-update a display record, creating it as `pending` when absent.
    /// `last_seen` is always refreshed; absent fields are left untouched and
    /// metrics are merged key by key.
    pub async fn register_or_update(
        &self,
        session_id: i64,
        display_id: &str,
        update: DisplayUpdate,
    ) -> Result<DisplayRecord, StoreError> {
        let key = registry_key(session_id);
        let mut record = match self.store.hget(&key, display_id).await? {
            Some(raw) => serde_json::from_str::<DisplayRecord>(&raw).unwrap_or_else(|e| {
                warn!("display {}: discarding corrupt record: {}", display_id, e);
                blank_record(display_id)
            }),
            None => blank_record(display_id),
        };

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(role) = update.role {
            record.role = Some(role);
        }
        if let Some(name) = update.name {
            record.name = Some(name);
        }
        if let Some(metrics) = update.metrics {
            record.metrics.extend(metrics);
        }
        if let Some(approved_by) = update.approved_by {
            record.approved_by = Some(approved_by);
        }
        if let Some(approved_at) = update.approved_at {
            record.approved_at = Some(approved_at);
        }
        record.last_seen = Utc::now().timestamp();

        let raw = serde_json::to_string(&record)
            .map_err(|e| StoreError::Unavailable(format!("record serialization: {}", e)))?;
        self.store.hset(&key, display_id, &raw).await?;
        Ok(record)
    }

    /// Approve a display, assigning its role and recording who approved it.
    pub async fn approve(
        &self,
        session_id: i64,
        display_id: &str,
        role: DisplayRole,
        approved_by: &str,
    ) -> Result<DisplayRecord, StoreError> {
        self.register_or_update(
            session_id,
            display_id,
            DisplayUpdate {
                status: Some(DisplayStatus::Approved),
                role: Some(role),
                approved_by: Some(approved_by.to_string()),
                approved_at: Some(Utc::now().timestamp()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_status(
        &self,
        session_id: i64,
        display_id: &str,
        status: DisplayStatus,
    ) -> Result<DisplayRecord, StoreError> {
        self.register_or_update(
            session_id,
            display_id,
            DisplayUpdate { status: Some(status), ..Default::default() },
        )
        .await
    }

    pub async fn list(&self, session_id: i64) -> Result<Vec<DisplayRecord>, StoreError> {
        let raw = self.store.hget_all(&registry_key(session_id)).await?;
        let mut displays: Vec<DisplayRecord> = raw
            .values()
            .filter_map(|value| serde_json::from_str(value).ok())
            .collect();
        displays.sort_by(|a, b| a.display_id.cmp(&b.display_id));
        Ok(displays)
    }

    /// Number of protected displays in approved or connected status.
    pub async fn protected_online(&self, session_id: i64) -> Result<usize, StoreError> {
        let displays = self.list(session_id).await?;
        Ok(displays
            .iter()
            .filter(|d| {
                d.role == Some(DisplayRole::Protected)
                    && matches!(d.status, DisplayStatus::Approved | DisplayStatus::Connected)
            })
            .count())
    }

    /// Gate for presenter publishing: enough protected displays must be
    /// approved or connected.
    pub async fn publishing_allowed(&self, session_id: i64) -> Result<bool, StoreError> {
        Ok(self.protected_online(session_id).await? >= self.protected_min)
    }

    /// Record the presenter currently publishing to the session. The liveness
    /// heartbeat reads this back while the presenter stays live.
    pub async fn set_live_presenter(
        &self,
        session_id: i64,
        presenter: &str,
    ) -> Result<(), StoreError> {
        self.store.set(&presenter_key(session_id), presenter, None).await
    }

    pub async fn clear_live_presenter(&self, session_id: i64) -> Result<(), StoreError> {
        self.store.del(&presenter_key(session_id)).await
    }

    pub async fn live_presenter(&self, session_id: i64) -> Result<Option<String>, StoreError> {
        self.store.get(&presenter_key(session_id)).await
    }
}

fn blank_record(display_id: &str) -> DisplayRecord {
    DisplayRecord {
        display_id: display_id.to_string(),
        status: DisplayStatus::Pending,
        role: None,
        name: None,
        last_seen: 0,
        metrics: Default::default(),
        approved_by: None,
        approved_at: None,
    }
}
