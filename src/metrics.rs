//! Metrics aggregator: dense, gap-free trail counts per time bucket

use crate::error::{Result, TrailError};
use crate::store::TrailStore;
use crate::types::MetricBucket;
use std::sync::Arc;

/// Most buckets one query may ask for
pub const DEFAULT_MAX_BUCKETS: usize = 100_000;

/// Builds time series from the trail store on demand
pub struct MetricsAggregator {
    store: Arc<dyn TrailStore>,
    max_buckets: usize,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn TrailStore>) -> Self {
        Self {
            store,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }

    /// Cap the number of buckets a single query may produce
    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.max_buckets = max_buckets;
        self
    }

    /// Count trails in `[start, end)` per `interval`-second bucket
    ///
    /// Buckets are anchored at `start`, not at the epoch, and group trails by
    /// their own `timestamp` rather than by ingestion time. Returns exactly
    /// `ceil((end - start) / interval)` buckets spaced by `interval`; empty
    /// ones have count 0. The store is queried once; bad arguments, including
    /// ranges needing more than `max_buckets` buckets, fail before any query.
    pub async fn aggregate(&self, start: i64, end: i64, interval: i64) -> Result<Vec<MetricBucket>> {
        validate_range(start, end, interval)?;
        let len = bucket_count(start, end, interval);
        if len > self.max_buckets as u128 {
            return Err(TrailError::InvalidRange { start, end, interval });
        }

        let counts = self.store.bucket_counts(start, end, interval).await?;

        let mut buckets = Vec::with_capacity(len as usize);
        let mut next = Some(start);
        while let Some(t) = next.filter(|t| *t < end) {
            buckets.push(MetricBucket {
                interval,
                starts_at: t,
                count: counts.get(&t).copied().unwrap_or(0),
            });
            next = t.checked_add(interval);
        }

        tracing::debug!(start, end, interval, buckets = buckets.len(), "Metrics aggregated");
        Ok(buckets)
    }
}

/// Reject `interval <= 0` and `end <= start`
pub fn validate_range(start: i64, end: i64, interval: i64) -> Result<()> {
    if interval <= 0 || end <= start {
        return Err(TrailError::InvalidRange { start, end, interval });
    }
    Ok(())
}

/// `ceil((end - start) / interval)` for a valid range, without overflow
fn bucket_count(start: i64, end: i64, interval: i64) -> u128 {
    let span = (end as i128 - start as i128) as u128;
    let interval = interval as u128;
    span.div_ceil(interval)
}
