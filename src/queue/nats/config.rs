//! NATS JetStream queue configuration

use serde::{Deserialize, Serialize};

/// Storage backend for the JetStream stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// Connection and consumer settings for the trail queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URL (e.g., "nats://127.0.0.1:4222")
    pub url: String,

    /// Optional auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// JetStream stream holding inbound trail messages
    pub stream_name: String,

    /// Subject producers publish trail bodies to
    pub subject: String,

    /// Durable pull consumer name
    pub consumer_name: String,

    pub storage: StorageType,

    /// Visibility timeout: how long a fetched message waits for an ack
    /// before JetStream redelivers it
    pub ack_wait_secs: u64,

    /// Maximum deliveries per message (0 = unlimited)
    pub max_deliver: i64,

    pub connect_timeout_secs: u64,

    pub request_timeout_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            token: None,
            stream_name: "A3S_TRAILS".to_string(),
            subject: "trails.inbound".to_string(),
            consumer_name: "a3s-trail".to_string(),
            storage: StorageType::File,
            ack_wait_secs: 30,
            max_deliver: 0,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
        }
    }
}
