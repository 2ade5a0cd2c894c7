//! PostgreSQL trail store on a shared `sqlx` pool
//!
//! One `trails` row per persisted trail; metadata documents are stored as
//! `jsonb` and returned verbatim.

use super::TrailStore;
use crate::error::{Result, TrailError};
use crate::types::{Document, TrailEvent, TrailRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::BTreeMap;
use std::time::Duration;

const CREATE_TRAILS: &str = r#"
CREATE TABLE IF NOT EXISTS trails (
    id              UUID PRIMARY KEY,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    timestamp       BIGINT NOT NULL,
    event           VARCHAR(100) NOT NULL, -- MAX_EVENT_LEN
    event_metadata  JSONB,
    actor           TEXT NOT NULL,
    actor_metadata  JSONB,
    target          TEXT NOT NULL,
    target_metadata JSONB,
    origin          TEXT NOT NULL,
    origin_metadata JSONB
)
"#;

const CREATE_TRAILS_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS trails_timestamp_idx ON trails (timestamp)";

#[derive(sqlx::FromRow)]
struct TrailRow {
    id: uuid::Uuid,
    created_at: DateTime<Utc>,
    timestamp: i64,
    event: String,
    event_metadata: Option<Document>,
    actor: String,
    actor_metadata: Option<Document>,
    target: String,
    target_metadata: Option<Document>,
    origin: String,
    origin_metadata: Option<Document>,
}

impl From<TrailRow> for TrailRecord {
    fn from(row: TrailRow) -> Self {
        TrailRecord {
            id: row.id,
            created_at: row.created_at,
            trail: TrailEvent {
                timestamp: row.timestamp,
                event: row.event,
                event_metadata: row.event_metadata.unwrap_or_default(),
                actor: row.actor,
                actor_metadata: row.actor_metadata.unwrap_or_default(),
                target: row.target,
                target_metadata: row.target_metadata.unwrap_or_default(),
                origin: row.origin,
                origin_metadata: row.origin_metadata.unwrap_or_default(),
            },
        }
    }
}

/// PostgreSQL-backed trail store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a new pool
    pub async fn connect(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| TrailError::Connection(format!("postgres: {}", e)))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `trails` table and its index if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in [CREATE_TRAILS, CREATE_TRAILS_TIMESTAMP_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| TrailError::Connection(format!("Failed to prepare schema: {}", e)))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TrailStore for PgStore {
    async fn insert(&self, trail: &TrailEvent) -> Result<TrailRecord> {
        let row: TrailRow = sqlx::query_as(
            r#"
            INSERT INTO trails (
                id, created_at, timestamp, event, event_metadata,
                actor, actor_metadata, target, target_metadata,
                origin, origin_metadata
            )
            VALUES ($1, now(), $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(trail.timestamp)
        .bind(&trail.event)
        .bind(&trail.event_metadata)
        .bind(&trail.actor)
        .bind(&trail.actor_metadata)
        .bind(&trail.target)
        .bind(&trail.target_metadata)
        .bind(&trail.origin)
        .bind(&trail.origin_metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TrailError::Persistence(format!("insert trail: {}", e)))?;

        Ok(row.into())
    }

    async fn list(&self) -> Result<Vec<TrailRecord>> {
        let rows: Vec<TrailRow> = sqlx::query_as("SELECT * FROM trails ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TrailError::Persistence(format!("list trails: {}", e)))?;

        Ok(rows.into_iter().map(TrailRecord::from).collect())
    }

    async fn bucket_counts(
        &self,
        start: i64,
        end: i64,
        interval: i64,
    ) -> Result<BTreeMap<i64, u64>> {
        // timestamp >= start, so div() floors; numeric keeps the full i64 range
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                ($1::numeric + div(timestamp::numeric - $1::numeric, $3::numeric) * $3::numeric)::bigint
                    AS bucket,
                COUNT(*) AS count
            FROM trails
            WHERE timestamp >= $1 AND timestamp < $2
            GROUP BY bucket
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(interval)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrailError::Persistence(format!("bucket counts: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(bucket, count)| (bucket, count as u64))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trails")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TrailError::Persistence(format!("count trails: {}", e)))?;
        Ok(count as u64)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
