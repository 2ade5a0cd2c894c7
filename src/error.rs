//! Error types for a3s-trail

use thiserror::Error;

/// Errors that can occur in the trail pipeline and query path
#[derive(Debug, Error)]
pub enum TrailError {
    /// Queue fetch/delete failed for a network or service reason
    #[error("Queue error: {0}")]
    Queue(String),

    /// Queue message body does not parse into a trail event
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Store write or read failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Bad aggregation arguments
    #[error("Invalid range: start={start}, end={end}, interval={interval}")]
    InvalidRange {
        start: i64,
        end: i64,
        interval: i64,
    },

    /// Deleting a message by receipt handle failed after persistence
    #[error("Failed to delete message '{receipt}': {reason}")]
    AckDeletion {
        receipt: String,
        reason: String,
    },

    /// Connection failure at startup
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A subscriber failed while handling a bus event
    #[error("Subscriber '{subscriber}' failed on topic '{topic}': {reason}")]
    Dispatch {
        subscriber: String,
        topic: String,
        reason: String,
    },

    /// Credential missing, invalid, or lacking permission
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The pipeline is shutting down and no longer accepts work
    #[error("Shutting down: {0}")]
    Shutdown(String),
}

impl TrailError {
    /// Whether the poller should back off and try again
    pub fn is_transient(&self) -> bool {
        matches!(self, TrailError::Queue(_) | TrailError::Connection(_))
    }
}

/// Result type alias for trail operations
pub type Result<T> = std::result::Result<T, TrailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TrailError::Queue("timeout".into()).is_transient());
        assert!(TrailError::Connection("refused".into()).is_transient());
        assert!(!TrailError::Malformed("bad json".into()).is_transient());
        assert!(!TrailError::InvalidRange { start: 1, end: 0, interval: 60 }.is_transient());
    }

    #[test]
    fn test_display_invalid_range() {
        let err = TrailError::InvalidRange { start: 10, end: 5, interval: 0 };
        assert_eq!(err.to_string(), "Invalid range: start=10, end=5, interval=0");
    }
}
