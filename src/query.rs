//! Read-side query service over the trail store

use crate::error::Result;
use crate::metrics::MetricsAggregator;
use crate::store::TrailStore;
use crate::types::{MetricBucket, TrailRecord};
use std::sync::Arc;

/// Answers the trail list and metrics queries
///
/// Shares the store with the persistence sink; any number of callers may
/// query concurrently with ingestion.
pub struct TrailQuery {
    store: Arc<dyn TrailStore>,
    aggregator: MetricsAggregator,
}

impl TrailQuery {
    pub fn new(store: Arc<dyn TrailStore>) -> Self {
        Self {
            aggregator: MetricsAggregator::new(store.clone()),
            store,
        }
    }

    /// All trails, newest first
    pub async fn trails(&self) -> Result<Vec<TrailRecord>> {
        self.store.list().await
    }

    /// Dense trail counts over `[start, end)` in `interval`-second buckets
    pub async fn metrics(&self, start: i64, end: i64, interval: i64) -> Result<Vec<MetricBucket>> {
        self.aggregator.aggregate(start, end, interval).await
    }
}
