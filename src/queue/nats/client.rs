//! NATS JetStream queue client: connect, fetch, delete

use super::config::{NatsConfig, StorageType};
use crate::error::{Result, TrailError};
use crate::queue::QueueClient;
use crate::types::{QueueMessage, ReceiptHandle};
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

type PullConsumer = jetstream::consumer::Consumer<jetstream::consumer::pull::Config>;

/// JetStream acknowledgement body
const ACK: &[u8] = b"+ACK";

/// Trail queue backed by a durable JetStream pull consumer
///
/// The receipt handle of a delivery is its JetStream reply subject;
/// deleting a message acknowledges it on that subject. Unacked messages
/// are redelivered after `ack_wait_secs`.
pub struct NatsQueue {
    client: async_nats::Client,

    consumer: PullConsumer,

    config: Arc<NatsConfig>,
}

impl NatsQueue {
    /// Connect to NATS and ensure the stream and durable consumer exist
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = build_connect_options(&config);

        let client = connect_opts
            .connect(&config.url)
            .await
            .map_err(|e| TrailError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let js = jetstream::new(client.clone());
        let stream = ensure_stream(&js, &config).await?;
        let consumer = ensure_consumer(&stream, &config).await?;

        Ok(Self {
            client,
            consumer,
            config: Arc::new(config),
        })
    }

    /// Publish a raw trail body to the inbound subject (producer side, used by tools and tests)
    pub async fn publish(&self, body: impl Into<Bytes>) -> Result<()> {
        let js = jetstream::new(self.client.clone());
        js.publish(self.config.subject.clone(), body.into())
            .await
            .map_err(|e| TrailError::Queue(format!("publish to '{}': {}", self.config.subject, e)))?
            .await
            .map_err(|e| TrailError::Queue(format!("publish ack failed: {}", e)))?;
        Ok(())
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

#[async_trait]
impl QueueClient for NatsQueue {
    async fn fetch(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueMessage>> {
        let batch = if wait.is_zero() {
            self.consumer
                .fetch()
                .max_messages(max_messages)
                .messages()
                .await
        } else {
            self.consumer
                .batch()
                .max_messages(max_messages)
                .expires(wait)
                .messages()
                .await
        }
        .map_err(|e| TrailError::Queue(format!("Failed to fetch batch: {}", e)))?;

        let mut batch = std::pin::pin!(batch);
        let mut messages = Vec::with_capacity(max_messages);

        while let Some(msg) = batch.next().await {
            match msg {
                Ok(msg) => {
                    let Some(reply) = msg.reply.as_ref() else {
                        tracing::warn!(subject = %msg.subject, "JetStream message without reply subject");
                        continue;
                    };
                    let delivery_count = msg.info().map(|info| info.delivered as u64).unwrap_or(1);
                    messages.push(QueueMessage {
                        body: msg.payload.clone(),
                        receipt: ReceiptHandle::new(reply.to_string()),
                        delivery_count,
                    });
                }
                Err(e) => {
                    if messages.is_empty() {
                        return Err(TrailError::Queue(format!("Failed to receive message: {}", e)));
                    }
                    tracing::warn!(error = %e, "Batch interrupted, keeping received messages");
                    break;
                }
            }
        }

        tracing::debug!(count = messages.len(), "Fetched batch");
        Ok(messages)
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<()> {
        // Request rather than publish so the server confirms the ack
        self.client
            .request(receipt.as_str().to_string(), Bytes::from_static(ACK))
            .await
            .map_err(|e| TrailError::AckDeletion {
                receipt: receipt.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(receipt = %receipt, "Message acknowledged");
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the inbound stream exists; work-queue retention drops acked messages
async fn ensure_stream(
    js: &jetstream::Context,
    config: &NatsConfig,
) -> Result<jetstream::stream::Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: vec![config.subject.clone()],
        storage,
        retention: jetstream::stream::RetentionPolicy::WorkQueue,
        ..Default::default()
    };

    let stream = js
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| TrailError::Connection(format!(
            "Failed to create/get stream '{}': {}",
            config.stream_name, e
        )))?;

    tracing::info!(
        stream = %config.stream_name,
        subject = %config.subject,
        "JetStream stream ready"
    );

    Ok(stream)
}

async fn ensure_consumer(
    stream: &jetstream::stream::Stream,
    config: &NatsConfig,
) -> Result<PullConsumer> {
    let consumer = stream
        .get_or_create_consumer(
            &config.consumer_name,
            jetstream::consumer::pull::Config {
                durable_name: Some(config.consumer_name.clone()),
                filter_subject: config.subject.clone(),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ack_wait: Duration::from_secs(config.ack_wait_secs),
                max_deliver: config.max_deliver,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| TrailError::Connection(format!(
            "Failed to create durable consumer '{}': {}",
            config.consumer_name, e
        )))?;

    tracing::info!(
        consumer = %config.consumer_name,
        ack_wait_secs = config.ack_wait_secs,
        "Durable consumer ready"
    );

    Ok(consumer)
}
