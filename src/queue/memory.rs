//! In-memory queue for testing and single-process use
//!
//! Mimics a hosted queue's visibility timeout: fetched messages are hidden
//! until deleted or until the timeout lapses, then become fetchable again
//! with a fresh receipt handle and a bumped delivery count.

use super::QueueClient;
use crate::error::{Result, TrailError};
use crate::types::{QueueMessage, ReceiptHandle};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Configuration for the in-memory queue
#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
    /// How long a fetched message stays hidden before redelivery
    pub visibility_timeout: Duration,

    /// Most recent deletions kept for `deleted()`; older ones are dropped
    pub deleted_log_capacity: usize,
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            deleted_log_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    body: Bytes,
    delivery_count: u64,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<ReceiptHandle, (StoredMessage, Instant)>,
    deleted: VecDeque<ReceiptHandle>,
    failing_fetches: usize,
    failing_deletes: bool,
}

impl QueueState {
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<ReceiptHandle> = self
            .in_flight
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some((msg, _)) = self.in_flight.remove(&handle) {
                tracing::debug!(receipt = %handle, message_id = msg.id, "Visibility timeout lapsed");
                self.ready.push_back(msg);
            }
        }
    }
}

/// In-memory queue with visibility timeouts and redelivery
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    config: MemoryQueueConfig,
}

impl MemoryQueue {
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            config,
        }
    }

    /// Enqueue a raw message body
    pub async fn push(&self, body: impl Into<Bytes>) {
        {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push_back(StoredMessage {
                id,
                body: body.into(),
                delivery_count: 0,
            });
        }
        self.notify.notify_one();
    }

    /// Enqueue a JSON document as the message body
    pub async fn push_json(&self, body: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(body)?;
        self.push(bytes).await;
        Ok(())
    }

    /// Messages waiting to be fetched
    pub async fn pending(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages fetched but neither deleted nor expired
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Messages still owned by the queue, visible or not
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Receipt handles successfully deleted, in deletion order
    ///
    /// Inspection aid for tests; holds only the latest
    /// `deleted_log_capacity` deletions.
    pub async fn deleted(&self) -> Vec<ReceiptHandle> {
        self.state.lock().await.deleted.iter().cloned().collect()
    }

    /// Make the next `count` fetches fail with a queue error
    pub async fn fail_next_fetches(&self, count: usize) {
        self.state.lock().await.failing_fetches = count;
    }

    /// Make every delete fail until switched back
    pub async fn fail_deletes(&self, failing: bool) {
        self.state.lock().await.failing_deletes = failing;
    }

    async fn take_ready(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        let mut state = self.state.lock().await;

        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(TrailError::Queue("injected fetch failure".to_string()));
        }

        let now = Instant::now();
        state.requeue_expired(now);

        let deadline = now + self.config.visibility_timeout;
        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(mut msg) = state.ready.pop_front() else {
                break;
            };
            msg.delivery_count += 1;
            let receipt = ReceiptHandle::new(format!("mem-{}-{}", msg.id, msg.delivery_count));
            batch.push(QueueMessage {
                body: msg.body.clone(),
                receipt: receipt.clone(),
                delivery_count: msg.delivery_count,
            });
            state.in_flight.insert(receipt, (msg, deadline));
        }

        Ok(batch)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(MemoryQueueConfig::default())
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn fetch(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueMessage>> {
        let batch = self.take_ready(max_messages).await?;
        if !batch.is_empty() || wait.is_zero() {
            return Ok(batch);
        }

        // Long poll: wake on push or give up after `wait`
        let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        self.take_ready(max_messages).await
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.failing_deletes {
            return Err(TrailError::AckDeletion {
                receipt: receipt.to_string(),
                reason: "injected delete failure".to_string(),
            });
        }

        match state.in_flight.remove(receipt) {
            Some((msg, _)) => {
                if self.config.deleted_log_capacity > 0 {
                    if state.deleted.len() == self.config.deleted_log_capacity {
                        state.deleted.pop_front();
                    }
                    state.deleted.push_back(receipt.clone());
                }
                tracing::debug!(receipt = %receipt, message_id = msg.id, "Message deleted");
                Ok(())
            }
            None => Err(TrailError::AckDeletion {
                receipt: receipt.to_string(),
                reason: "unknown or expired receipt handle".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
