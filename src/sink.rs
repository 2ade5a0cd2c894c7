//! Persistence sink: stores trails and reports the outcome on the bus

use crate::bus::{Emitter, Subscriber};
use crate::error::Result;
use crate::store::TrailStore;
use crate::types::{BusEvent, EventKind, TOPIC_TRAIL_CREATE};
use async_trait::async_trait;
use std::sync::Arc;

/// Subscribes to `trail:create`; emits `trail:status` complete or failed
///
/// A failed write is reported, never retried here. Redelivery of the
/// queue message is the retry.
pub struct PersistenceSink {
    store: Arc<dyn TrailStore>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn TrailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Subscriber for PersistenceSink {
    fn name(&self) -> &str {
        "persistence"
    }

    fn topics(&self) -> Vec<String> {
        vec![TOPIC_TRAIL_CREATE.to_string()]
    }

    async fn handle(&self, event: &BusEvent, emitter: &mut Emitter) -> Result<()> {
        let Some(trail) = event.trail() else {
            return Ok(());
        };

        match self.store.insert(trail).await {
            Ok(record) => {
                tracing::debug!(
                    correlation = %event.correlation.id,
                    trail_id = %record.id,
                    event = %trail.event,
                    "Trail persisted"
                );
                emitter.emit(event.follow_up(EventKind::StatusComplete));
            }
            Err(e) => {
                tracing::error!(
                    correlation = %event.correlation.id,
                    store = self.store.name(),
                    error = %e,
                    "Trail persistence failed"
                );
                emitter.emit(event.follow_up(EventKind::StatusFailed {
                    error: e.to_string(),
                }));
            }
        }

        Ok(())
    }
}
