//! Queue client trait: the inbound message source
//!
//! All queue backends (NATS JetStream, in-memory, etc.) implement
//! `QueueClient`. The poller is the only reader; the ack reconciler is the
//! only deleter.

use crate::error::Result;
use crate::types::{QueueMessage, ReceiptHandle};
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;
pub mod nats;

/// Core trait for queue backends
///
/// A fetched message stays invisible to other fetches until it is deleted
/// or the backend's visibility timeout expires, at which point it is
/// redelivered with a new receipt handle.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Fetch up to `max_messages`, waiting at most `wait` for the first one
    async fn fetch(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Delete one delivery by its receipt handle
    ///
    /// Deleting an unknown or expired handle returns `TrailError::AckDeletion`;
    /// callers treat it as non-fatal.
    async fn delete(&self, receipt: &ReceiptHandle) -> Result<()>;

    /// Backend name (e.g., "nats", "memory")
    fn name(&self) -> &str;
}
