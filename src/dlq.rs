//! Dead-letter log: record messages the pipeline could not take through
//!
//! Entries are informational only. A recorded message is never deleted or
//! re-routed here; it stays on the queue and the queue's own redelivery and
//! redrive policy decides its fate.

use crate::error::Result;
use crate::types::ReceiptHandle;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Why a message ended up in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// Body did not parse into a trail event
    Malformed,
    /// The store write failed
    PersistenceFailed,
}

/// One logged failure
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Receipt handle of the failed delivery
    pub receipt: ReceiptHandle,

    pub reason: DeadLetterReason,

    /// Parse or store error text
    pub detail: String,

    /// Unix timestamp in milliseconds when the failure was recorded
    pub recorded_at: u64,
}

impl DeadLetter {
    pub fn new(receipt: ReceiptHandle, reason: DeadLetterReason, detail: impl Into<String>) -> Self {
        Self {
            receipt,
            reason,
            detail: detail.into(),
            recorded_at: now_millis(),
        }
    }
}

/// Trait for dead-letter log backends
#[async_trait]
pub trait DlqHandler: Send + Sync {
    /// Record a failure
    async fn record(&self, letter: DeadLetter) -> Result<()>;

    /// Number of recorded failures currently held
    async fn count(&self) -> Result<usize>;

    /// Most recent failures first
    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>>;
}

/// In-memory dead-letter log with a capacity bound
pub struct MemoryDlqHandler {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
    max_letters: usize,
}

impl MemoryDlqHandler {
    /// `max_letters == 0` keeps everything
    pub fn new(max_letters: usize) -> Self {
        Self {
            letters: Arc::new(RwLock::new(Vec::new())),
            max_letters,
        }
    }
}

impl Default for MemoryDlqHandler {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl DlqHandler for MemoryDlqHandler {
    async fn record(&self, letter: DeadLetter) -> Result<()> {
        tracing::warn!(
            receipt = %letter.receipt,
            reason = ?letter.reason,
            detail = %letter.detail,
            "Message dead-lettered"
        );

        let mut letters = self.letters.write().await;
        letters.push(letter);

        if self.max_letters > 0 && letters.len() > self.max_letters {
            let drain_count = letters.len() - self.max_letters;
            letters.drain(..drain_count);
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.letters.read().await.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let letters = self.letters.read().await;
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
