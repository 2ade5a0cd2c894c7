//! Trail store trait: durable storage behind the sink and the read path
//!
//! The persistence sink writes through `insert`; the query service and the
//! metrics aggregator read through `list` and `bucket_counts`. Implementations
//! must tolerate concurrent writers and readers.

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::types::{TrailEvent, TrailRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod memory;
pub mod postgres;

/// Core trait for trail storage backends
#[async_trait]
pub trait TrailStore: Send + Sync {
    /// Store one trail as a new row, returning the row
    ///
    /// No idempotency key: inserting the same trail twice yields two rows.
    async fn insert(&self, trail: &TrailEvent) -> Result<TrailRecord>;

    /// All rows, newest `created_at` first
    async fn list(&self) -> Result<Vec<TrailRecord>>;

    /// Sparse counts of trails with `start <= timestamp < end`, keyed by
    /// `start + floor((timestamp - start) / interval) * interval`
    ///
    /// Callers validate the range; implementations may assume
    /// `interval > 0` and `end > start`.
    async fn bucket_counts(&self, start: i64, end: i64, interval: i64)
        -> Result<BTreeMap<i64, u64>>;

    /// Total number of rows
    async fn count(&self) -> Result<u64>;

    /// Backend name (e.g., "postgres", "memory")
    fn name(&self) -> &str;
}

/// Open the configured backend, creating the schema where needed
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn TrailStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(memory::MemoryStore::new())),
        StoreBackend::Postgres => {
            let store =
                postgres::PgStore::connect(&config.url, config.max_connections, config.acquire_timeout())
                    .await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

/// Bucket start for `timestamp` in a series anchored at `start`
///
/// Computed in `i128` so the whole `i64` range works; the result saturates
/// only for timestamps below `start` near `i64::MIN`.
pub fn bucket_start(timestamp: i64, start: i64, interval: i64) -> i64 {
    let (timestamp, start, interval) = (timestamp as i128, start as i128, interval as i128);
    let bucket = start + (timestamp - start).div_euclid(interval) * interval;
    bucket.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
