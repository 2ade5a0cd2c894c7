//! Message poller: drains the queue into the dispatcher
//!
//! The only component that reads from the queue. Parsed messages become
//! `trail:create` events; malformed ones are logged and left on the queue
//! for its redelivery/dead-letter policy.

use crate::dispatcher::Dispatcher;
use crate::dlq::{DeadLetter, DeadLetterReason, DlqHandler};
use crate::error::{Result, TrailError};
use crate::queue::QueueClient;
use crate::types::{BusEvent, Correlation, QueueMessage, TrailEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Poll loop settings
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Messages requested per fetch
    pub batch_size: usize,

    /// Long-poll wait per fetch
    pub wait: Duration,

    /// Pause between successful polls
    pub poll_interval: Duration,

    /// First delay after a failed fetch
    pub backoff_initial: Duration,

    /// Cap on the failed-fetch delay
    pub backoff_max: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            wait: Duration::from_secs(20),
            poll_interval: Duration::from_millis(100),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff: doubles from `initial` up to `max`, reset on success
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: None,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// What one poll did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub dispatched: usize,
    pub malformed: usize,
}

pub struct Poller {
    queue: Arc<dyn QueueClient>,
    dispatcher: Arc<Dispatcher>,
    dlq: Option<Arc<dyn DlqHandler>>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(queue: Arc<dyn QueueClient>, dispatcher: Arc<Dispatcher>, config: PollerConfig) -> Self {
        Self {
            queue,
            dispatcher,
            dlq: None,
            config,
        }
    }

    /// Also log malformed messages to a dead-letter log
    pub fn with_dlq(mut self, dlq: Arc<dyn DlqHandler>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    /// Poll until `cancel` fires
    ///
    /// Cancellation aborts a pending fetch. A batch already fetched is
    /// handed to the dispatcher in full before the loop exits.
    pub async fn poll(&self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);

        tracing::info!(
            queue = self.queue.name(),
            batch_size = self.config.batch_size,
            wait_secs = self.config.wait.as_secs(),
            "Poller started"
        );

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = self.queue.fetch(self.config.batch_size, self.config.wait) => fetched,
            };

            let delay = match fetched {
                Ok(messages) => {
                    backoff.reset();
                    let summary = self.handle_batch(messages).await;
                    if summary.fetched > 0 {
                        tracing::debug!(
                            fetched = summary.fetched,
                            dispatched = summary.dispatched,
                            malformed = summary.malformed,
                            "Batch handled"
                        );
                    }
                    self.config.poll_interval
                }
                Err(e) => self.delay_after_error(&e, &mut backoff),
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(queue = self.queue.name(), "Poller stopped");
    }

    /// Back off on transient queue errors; retry anything else on the normal tick
    fn delay_after_error(&self, error: &TrailError, backoff: &mut Backoff) -> Duration {
        if error.is_transient() {
            let delay = backoff.next_delay();
            tracing::error!(
                queue = self.queue.name(),
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "Queue fetch failed"
            );
            delay
        } else {
            tracing::error!(
                queue = self.queue.name(),
                error = %error,
                "Queue fetch returned a non-transient error, continuing"
            );
            self.config.poll_interval
        }
    }

    /// Fetch and handle one batch
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let messages = self
            .queue
            .fetch(self.config.batch_size, self.config.wait)
            .await?;
        Ok(self.handle_batch(messages).await)
    }

    async fn handle_batch(&self, messages: Vec<QueueMessage>) -> PollSummary {
        let mut summary = PollSummary {
            fetched: messages.len(),
            ..Default::default()
        };

        for msg in messages {
            match TrailEvent::parse(&msg.body) {
                Ok(trail) => {
                    let correlation = Correlation::from_receipt(msg.receipt);
                    let event = BusEvent::create(trail, correlation);
                    match self.dispatcher.submit(event).await {
                        Ok(()) => summary.dispatched += 1,
                        Err(e) => {
                            // Not deleted, so it comes back after the visibility timeout
                            tracing::warn!(error = %e, "Dispatch refused message");
                        }
                    }
                }
                Err(e) => {
                    summary.malformed += 1;
                    tracing::warn!(
                        receipt = %msg.receipt,
                        delivery_count = msg.delivery_count,
                        error = %e,
                        "Malformed message left on queue"
                    );
                    if let Some(dlq) = &self.dlq {
                        let letter = DeadLetter::new(msg.receipt, DeadLetterReason::Malformed, e.to_string());
                        if let Err(e) = dlq.record(letter).await {
                            tracing::warn!(error = %e, "Failed to record dead letter");
                        }
                    }
                }
            }
        }

        summary
    }
}
