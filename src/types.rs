//! Core types for the a3s-trail pipeline
//!
//! Trail events and the queue envelope use snake_case JSON to match the
//! body producers put on the queue. Bus events are in-process only and are
//! never serialized.

use crate::error::{Result, TrailError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque structured document attached to a trail event
///
/// Stored and returned verbatim; no schema is enforced.
pub type Document = serde_json::Value;

/// Longest event name the trail store accepts
pub const MAX_EVENT_LEN: usize = 100;

/// One immutable audit record: an actor did something to a target from an origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailEvent {
    /// Unix timestamp in seconds
    pub timestamp: i64,

    /// Event name (e.g., "user.login", "repo.delete")
    pub event: String,

    #[serde(default)]
    pub event_metadata: Document,

    #[serde(default)]
    pub actor: String,

    #[serde(default)]
    pub actor_metadata: Document,

    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub target_metadata: Document,

    #[serde(default)]
    pub origin: String,

    #[serde(default)]
    pub origin_metadata: Document,
}

impl TrailEvent {
    /// Create a trail event with empty metadata
    pub fn new(
        timestamp: i64,
        event: impl Into<String>,
        actor: impl Into<String>,
        target: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            event: event.into(),
            event_metadata: Document::Null,
            actor: actor.into(),
            actor_metadata: Document::Null,
            target: target.into(),
            target_metadata: Document::Null,
            origin: origin.into(),
            origin_metadata: Document::Null,
        }
    }

    /// Parse a queue message body
    ///
    /// Event names longer than `MAX_EVENT_LEN` characters are malformed; the
    /// store could never hold them.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let trail: Self =
            serde_json::from_slice(body).map_err(|e| TrailError::Malformed(e.to_string()))?;

        let len = trail.event.chars().count();
        if len > MAX_EVENT_LEN {
            return Err(TrailError::Malformed(format!(
                "event name is {} characters, limit is {}",
                len, MAX_EVENT_LEN
            )));
        }
        Ok(trail)
    }

    pub fn with_event_metadata(mut self, metadata: Document) -> Self {
        self.event_metadata = metadata;
        self
    }

    pub fn with_actor_metadata(mut self, metadata: Document) -> Self {
        self.actor_metadata = metadata;
        self
    }

    pub fn with_target_metadata(mut self, metadata: Document) -> Self {
        self.target_metadata = metadata;
        self
    }

    pub fn with_origin_metadata(mut self, metadata: Document) -> Self {
        self.origin_metadata = metadata;
        self
    }
}

/// Queue-issued token required to delete one specific delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message fetched from the queue
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Raw message body
    pub body: Bytes,

    /// Handle needed to delete this delivery
    pub receipt: ReceiptHandle,

    /// Number of times the queue has delivered this message (1 on first delivery)
    pub delivery_count: u64,
}

/// Links every bus event derived from one queue message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// Short stable id derived from the receipt handle
    pub id: String,

    /// Receipt handle of the originating message
    pub receipt: ReceiptHandle,
}

impl Correlation {
    pub fn from_receipt(receipt: ReceiptHandle) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        receipt.hash(&mut hasher);
        Self {
            id: format!("{:016x}", hasher.finish()),
            receipt,
        }
    }
}

/// Bus event action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Status,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Status => "status",
            Action::Delete => "delete",
        }
    }
}

/// Bus event state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Queued,
    Complete,
    Failed,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Queued => "queued",
            State::Complete => "complete",
            State::Failed => "failed",
        }
    }
}

/// Typed payload of a bus event
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A parsed trail waiting to be persisted
    TrailCreate(TrailEvent),
    /// The trail was durably stored
    StatusComplete,
    /// The store write failed
    StatusFailed { error: String },
    /// Directive to delete the originating queue message
    Delete,
}

/// Name shared by every event the trail pipeline emits
pub const TRAIL: &str = "trail";

/// Topic a persistence stage subscribes to
pub const TOPIC_TRAIL_CREATE: &str = "trail:create";

/// Topic carrying persistence outcomes
pub const TOPIC_TRAIL_STATUS: &str = "trail:status";

/// Topic carrying explicit delete directives
pub const TOPIC_TRAIL_DELETE: &str = "trail:delete";

/// In-process dispatch envelope
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Unique event identifier (bus-<uuid>)
    pub id: String,

    /// Event name; the topic is `<name>:<action>`
    pub name: String,

    /// Originating queue message
    pub correlation: Correlation,

    pub kind: EventKind,

    pub emitted_at: DateTime<Utc>,
}

impl BusEvent {
    fn build(correlation: Correlation, kind: EventKind) -> Self {
        Self {
            id: format!("bus-{}", uuid::Uuid::new_v4()),
            name: TRAIL.to_string(),
            correlation,
            kind,
            emitted_at: Utc::now(),
        }
    }

    /// A freshly parsed trail, ready for persistence
    pub fn create(trail: TrailEvent, correlation: Correlation) -> Self {
        Self::build(correlation, EventKind::TrailCreate(trail))
    }

    /// Persistence succeeded for `correlation`
    pub fn complete(correlation: Correlation) -> Self {
        Self::build(correlation, EventKind::StatusComplete)
    }

    /// Persistence failed for `correlation`
    pub fn failed(correlation: Correlation, error: impl Into<String>) -> Self {
        Self::build(
            correlation,
            EventKind::StatusFailed {
                error: error.into(),
            },
        )
    }

    /// Delete the originating queue message
    pub fn delete(correlation: Correlation) -> Self {
        Self::build(correlation, EventKind::Delete)
    }

    /// Derive a follow-up event that keeps this event's name and correlation
    pub fn follow_up(&self, kind: EventKind) -> Self {
        let mut event = Self::build(self.correlation.clone(), kind);
        event.name = self.name.clone();
        event
    }

    pub fn action(&self) -> Action {
        match self.kind {
            EventKind::TrailCreate(_) => Action::Create,
            EventKind::StatusComplete | EventKind::StatusFailed { .. } => Action::Status,
            EventKind::Delete => Action::Delete,
        }
    }

    pub fn state(&self) -> State {
        match self.kind {
            EventKind::TrailCreate(_) | EventKind::Delete => State::Queued,
            EventKind::StatusComplete => State::Complete,
            EventKind::StatusFailed { .. } => State::Failed,
        }
    }

    /// Routing key, e.g. `trail:create`
    pub fn topic(&self) -> String {
        format!("{}:{}", self.name, self.action().as_str())
    }

    /// Error detail for failed status events
    pub fn error(&self) -> Option<&str> {
        match &self.kind {
            EventKind::StatusFailed { error } => Some(error),
            _ => None,
        }
    }

    /// The trail payload, if this is a create event
    pub fn trail(&self) -> Option<&TrailEvent> {
        match &self.kind {
            EventKind::TrailCreate(trail) => Some(trail),
            _ => None,
        }
    }
}

/// A persisted trail row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailRecord {
    pub id: uuid::Uuid,

    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub trail: TrailEvent,
}

/// One bucket of a metrics time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBucket {
    /// Bucket width in seconds
    pub interval: i64,

    /// Bucket start, Unix seconds
    pub starts_at: i64,

    /// Number of trails with `starts_at <= timestamp < starts_at + interval`
    pub count: u64,
}
