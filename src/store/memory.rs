//! In-memory trail store for development and testing

use super::{bucket_start, TrailStore};
use crate::error::{Result, TrailError};
use crate::types::{TrailEvent, TrailRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Rows {
    records: Vec<TrailRecord>,
    last_created: Option<DateTime<Utc>>,
}

/// Stores trail rows in a `Vec`; lost on drop
///
/// `created_at` is strictly increasing across inserts so creation order is
/// always well-defined, even for inserts within the same clock tick.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<Rows>,
    failing_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts fail until switched back
    pub fn fail_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrailStore for MemoryStore {
    async fn insert(&self, trail: &TrailEvent) -> Result<TrailRecord> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(TrailError::Persistence("injected write failure".to_string()));
        }

        let mut rows = self.rows.write().await;

        let mut created_at = Utc::now();
        if let Some(last) = rows.last_created {
            if created_at <= last {
                created_at = last + Duration::microseconds(1);
            }
        }
        rows.last_created = Some(created_at);

        let record = TrailRecord {
            id: uuid::Uuid::new_v4(),
            created_at,
            trail: trail.clone(),
        };
        rows.records.push(record.clone());

        Ok(record)
    }

    async fn list(&self) -> Result<Vec<TrailRecord>> {
        let rows = self.rows.read().await;
        let mut records = rows.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn bucket_counts(
        &self,
        start: i64,
        end: i64,
        interval: i64,
    ) -> Result<BTreeMap<i64, u64>> {
        let rows = self.rows.read().await;
        let mut counts = BTreeMap::new();

        for record in &rows.records {
            let ts = record.trail.timestamp;
            if ts >= start && ts < end {
                *counts.entry(bucket_start(ts, start, interval)).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.read().await.records.len() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trail(ts: i64) -> TrailEvent {
        TrailEvent::new(ts, "login", "u1", "app", "web")
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_creation_time() {
        let store = MemoryStore::new();
        let record = store.insert(&trail(100)).await.unwrap();

        assert_eq!(record.trail.timestamp, 100);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.list().await.unwrap()[0].id, record.id);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryStore::new();
        let first = store.insert(&trail(1)).await.unwrap();
        let second = store.insert(&trail(2)).await.unwrap();
        let third = store.insert(&trail(3)).await.unwrap();

        assert!(first.created_at < second.created_at);
        assert!(second.created_at < third.created_at);

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn test_duplicates_are_stored_twice() {
        let store = MemoryStore::new();
        store.insert(&trail(5)).await.unwrap();
        store.insert(&trail(5)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let err = store.insert(&trail(1)).await.unwrap_err();
        assert!(matches!(err, TrailError::Persistence(_)));
        assert_eq!(store.count().await.unwrap(), 0);

        store.fail_writes(false);
        store.insert(&trail(1)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bucket_counts_half_open_range() {
        let store = MemoryStore::new();
        for ts in [0, 59, 60, 100, 179, 180, 500] {
            store.insert(&trail(ts)).await.unwrap();
        }

        let counts = store.bucket_counts(0, 180, 60).await.unwrap();
        assert_eq!(counts.get(&0), Some(&2));
        assert_eq!(counts.get(&60), Some(&2));
        assert_eq!(counts.get(&120), Some(&1));
        assert_eq!(counts.len(), 3);
    }
}
