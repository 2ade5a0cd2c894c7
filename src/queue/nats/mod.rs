//! NATS JetStream queue backend
//!
//! Implements `QueueClient` on a durable JetStream pull consumer with
//! explicit acks, giving at-least-once delivery with redelivery after the
//! ack wait.

mod client;
mod config;

pub use client::NatsQueue;
pub use config::{NatsConfig, StorageType};
