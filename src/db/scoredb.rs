// Read path into the canonical score ledger. The hub queries totals for the
// score heartbeat and the display snapshot; it never writes scores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use tokio::sync::OnceCell;
use tracing::info;

use crate::models::TeamScore;

// Global database instance
static DB: OnceCell<Arc<ScoreDb>> = OnceCell::const_new();

/// Initialize the global ledger connection
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = ScoreDb::new(database_url).await?;
    DB.set(Arc::new(db)).map_err(|_| "Score ledger already initialized")?;
    Ok(())
}

/// Get the global ledger instance, if initialized
pub fn get_db() -> Option<Arc<ScoreDb>> {
    DB.get().cloned()
}

/// Read-only connection pool into the score ledger
pub struct ScoreDb {
    pool: PgPool,
}

impl ScoreDb {
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to score ledger...");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        info!("Score ledger connection pool created successfully");

        Ok(Self { pool })
    }

    /// Totals for the given teams in a session, sorted by descending total
    /// then team name. Restricting to the caller's team set keeps heartbeat
    /// payloads bounded and avoids leaking disconnected teams' data.
    pub async fn team_totals(
        &self,
        session_id: i64,
        team_ids: &HashSet<i64>,
    ) -> Result<Vec<TeamScore>, SqlxError> {
        if team_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = team_ids.iter().copied().collect();

        let rows = sqlx::query(
            "SELECT t.id AS team_id, t.name AS team_name, COALESCE(s.total, 0) AS total \
             FROM team_sessions ts \
             JOIN teams t ON t.id = ts.team_id \
             LEFT JOIN scores s ON s.team_session_id = ts.id \
             WHERE ts.session_id = $1 AND t.id = ANY($2) \
             ORDER BY total DESC, t.name ASC",
        )
        .bind(session_id)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TeamScore {
                team_id: row.get("team_id"),
                team_name: row.get("team_name"),
                total: row.get("total"),
            })
            .collect())
    }
}
