//! Ack reconciler: ties queue deletion to confirmed persistence
//!
//! `trail:status` complete turns into a `trail:delete` directive for the
//! same correlation, and `trail:delete` removes the originating message from
//! the queue. Nothing else deletes, so a message whose trail was never
//! confirmed stored stays on the queue and is redelivered.

use crate::bus::{Emitter, Subscriber};
use crate::dlq::{DeadLetter, DeadLetterReason, DlqHandler};
use crate::error::Result;
use crate::queue::QueueClient;
use crate::types::{BusEvent, EventKind, TOPIC_TRAIL_DELETE, TOPIC_TRAIL_STATUS};
use async_trait::async_trait;
use std::sync::Arc;

/// Subscribes to `trail:status` and `trail:delete`
pub struct AckReconciler {
    queue: Arc<dyn QueueClient>,
    dlq: Option<Arc<dyn DlqHandler>>,
}

impl AckReconciler {
    pub fn new(queue: Arc<dyn QueueClient>) -> Self {
        Self { queue, dlq: None }
    }

    /// Also log failed persistence to a dead-letter log
    pub fn with_dlq(mut self, dlq: Arc<dyn DlqHandler>) -> Self {
        self.dlq = Some(dlq);
        self
    }
}

#[async_trait]
impl Subscriber for AckReconciler {
    fn name(&self) -> &str {
        "ack"
    }

    fn topics(&self) -> Vec<String> {
        vec![
            TOPIC_TRAIL_STATUS.to_string(),
            TOPIC_TRAIL_DELETE.to_string(),
        ]
    }

    async fn handle(&self, event: &BusEvent, emitter: &mut Emitter) -> Result<()> {
        match &event.kind {
            EventKind::StatusComplete => {
                emitter.emit(event.follow_up(EventKind::Delete));
            }
            EventKind::StatusFailed { error } => {
                tracing::warn!(
                    correlation = %event.correlation.id,
                    error = %error,
                    "Persistence failed, leaving message for redelivery"
                );
                if let Some(dlq) = &self.dlq {
                    dlq.record(DeadLetter::new(
                        event.correlation.receipt.clone(),
                        DeadLetterReason::PersistenceFailed,
                        error.clone(),
                    ))
                    .await?;
                }
            }
            EventKind::Delete => {
                // A failed delete means the message will come back and be stored again
                self.queue.delete(&event.correlation.receipt).await?;
                tracing::debug!(
                    correlation = %event.correlation.id,
                    queue = self.queue.name(),
                    "Message deleted after persistence"
                );
            }
            EventKind::TrailCreate(_) => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::MemoryDlqHandler;
    use crate::error::TrailError;
    use crate::queue::memory::MemoryQueue;
    use crate::types::{Action, Correlation};
    use std::time::Duration;

    async fn fetched_correlation(queue: &MemoryQueue) -> Correlation {
        queue.push(r#"{"timestamp": 1, "event": "x"}"#).await;
        let msg = queue.fetch(1, Duration::ZERO).await.unwrap().remove(0);
        Correlation::from_receipt(msg.receipt)
    }

    #[tokio::test]
    async fn test_complete_emits_delete_without_deleting() {
        let queue = Arc::new(MemoryQueue::default());
        let correlation = fetched_correlation(&queue).await;
        let ack = AckReconciler::new(queue.clone());

        let mut emitter = Emitter::default();
        ack.handle(&BusEvent::complete(correlation.clone()), &mut emitter)
            .await
            .unwrap();

        let emitted = emitter.into_events();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].action(), Action::Delete);
        assert_eq!(emitted[0].correlation, correlation);
        assert!(queue.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_message() {
        let queue = Arc::new(MemoryQueue::default());
        let correlation = fetched_correlation(&queue).await;
        let ack = AckReconciler::new(queue.clone());

        let mut emitter = Emitter::default();
        ack.handle(&BusEvent::delete(correlation.clone()), &mut emitter)
            .await
            .unwrap();

        assert_eq!(queue.deleted().await, vec![correlation.receipt]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_status_never_deletes() {
        let queue = Arc::new(MemoryQueue::default());
        let dlq = Arc::new(MemoryDlqHandler::default());
        let correlation = fetched_correlation(&queue).await;
        let ack = AckReconciler::new(queue.clone()).with_dlq(dlq.clone());

        let mut emitter = Emitter::default();
        ack.handle(&BusEvent::failed(correlation.clone(), "db down"), &mut emitter)
            .await
            .unwrap();

        assert!(emitter.is_empty());
        assert!(queue.deleted().await.is_empty());
        assert_eq!(queue.in_flight().await, 1);

        let letters = dlq.list(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::PersistenceFailed);
        assert_eq!(letters[0].receipt, correlation.receipt);
    }

    #[tokio::test]
    async fn test_delete_failure_surfaces_ack_error() {
        let queue = Arc::new(MemoryQueue::default());
        let correlation = fetched_correlation(&queue).await;
        queue.fail_deletes(true).await;
        let ack = AckReconciler::new(queue.clone());

        let mut emitter = Emitter::default();
        let err = ack
            .handle(&BusEvent::delete(correlation), &mut emitter)
            .await
            .unwrap_err();

        assert!(matches!(err, TrailError::AckDeletion { .. }));
        assert_eq!(queue.in_flight().await, 1);
    }
}
