//! Registry error types

use thiserror::Error;

use super::key::StreamKey;
use crate::sink::{SinkError, SinkId};

/// Error type for registry operations
///
/// None of these are fatal to the process; each concerns one stream or one
/// sink.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Stream already has a publisher
    #[error("stream already has a publisher: {0}")]
    AlreadyPublishing(StreamKey),

    /// No publisher is registered for the stream
    #[error("no active publisher for stream: {0}")]
    NoActivePublisher(StreamKey),

    /// Publisher ID mismatch
    #[error("stream {key} is held by session {holder}, not {session_id}")]
    PublisherMismatch {
        key: StreamKey,
        holder: u64,
        session_id: u64,
    },

    /// Application is unknown or has the requested feature disabled
    #[error("application not enabled: {0}")]
    ApplicationDisabled(String),

    /// A sink failed while being attached
    #[error("{sink} failed: {source}")]
    SinkWriteFailed {
        sink: SinkId,
        #[source]
        source: SinkError,
    },
}

impl RegistryError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::NoActivePublisher(_) | RegistryError::AlreadyPublishing(_)
        )
    }
}
