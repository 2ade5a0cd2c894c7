//! # a3s-trail
//!
//! Audit-trail ingestion for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-trail` drains trail messages from a durable queue, stores each one,
//! and deletes the message only after the store confirmed the write. Every
//! step travels as an event on an in-process bus, so one message produces
//! the causal chain `trail:create` → `trail:status` → `trail:delete`.
//! Delivery is at-least-once: a failed write or a failed delete leaves the
//! message on the queue to be redelivered.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_trail::Pipeline;
//! use a3s_trail::config::PipelineConfig;
//! use a3s_trail::queue::memory::MemoryQueue;
//! use a3s_trail::store::memory::MemoryStore;
//!
//! # async fn example() -> a3s_trail::Result<()> {
//! let queue = Arc::new(MemoryQueue::default());
//! queue.push(r#"{"timestamp": 1700000000, "event": "login"}"#).await;
//!
//! let pipeline = Pipeline::new(queue, Arc::new(MemoryStore::new()), PipelineConfig::default())?;
//! let summary = pipeline.poller().poll_once().await?;
//! assert_eq!(summary.dispatched, 1);
//!
//! pipeline.dispatcher().shutdown().await;
//! let trails = pipeline.query().trails().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! - **queue**: NATS JetStream durable pull consumer, or in-memory
//! - **store**: PostgreSQL, or in-memory
//!
//! ## Architecture
//!
//! - **Poller**: the only queue reader; turns messages into `trail:create`
//! - **Dispatcher**: worker pool keyed by correlation id in front of the bus
//! - **EventBus**: topic registry and FIFO causal-chain dispatch
//! - **PersistenceSink** / **AckReconciler**: the default bus subscribers
//! - **TrailQuery** / **MetricsAggregator**: the read side

pub mod ack;
pub mod auth;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod dlq;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod poller;
pub mod query;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod store;
pub mod types;

// Re-export core types
pub use ack::AckReconciler;
pub use bus::{DispatchReport, Emitter, EventBus, Subscriber};
pub use config::{PipelineConfig, StoreBackend, StoreConfig, TrailConfig};
pub use dispatcher::Dispatcher;
pub use dlq::{DeadLetter, DeadLetterReason, DlqHandler, MemoryDlqHandler};
pub use error::{Result, TrailError};
pub use metrics::MetricsAggregator;
pub use pipeline::Pipeline;
pub use poller::{Backoff, PollSummary, Poller, PollerConfig};
pub use query::TrailQuery;
pub use queue::QueueClient;
pub use registry::{ComponentContext, ComponentRegistry};
pub use sink::PersistenceSink;
pub use store::TrailStore;
pub use types::{
    Action, BusEvent, Correlation, EventKind, MetricBucket, QueueMessage, ReceiptHandle, State,
    TrailEvent, TrailRecord,
};

// Re-export backends for convenience
pub use queue::memory::{MemoryQueue, MemoryQueueConfig};
pub use queue::nats::{NatsConfig, NatsQueue, StorageType};
pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
