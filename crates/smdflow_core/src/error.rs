//! Error types for smdflow core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while reading and building events.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Channel source error.
    #[error("storage error: {0}")]
    Storage(#[from] smdflow_storage::StorageError),

    /// Framing error.
    #[error("codec error: {0}")]
    Codec(#[from] smdflow_codec::CodecError),

    /// A single record does not fit in the chunk buffer.
    ///
    /// Fatal: the chunk size must be raised.
    #[error("channel {channel}: record of {record_size} bytes larger than chunk size {chunk_size}")]
    ChunkOverflow {
        /// Channel index.
        channel: usize,
        /// Declared size of the offending record.
        record_size: usize,
        /// Configured chunk capacity.
        chunk_size: usize,
    },

    /// A record header or body is malformed.
    #[error("corrupt record at offset {offset}: {message}")]
    CorruptRecord {
        /// Byte offset within the view.
        offset: usize,
        /// Description of the problem.
        message: String,
    },

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A reader was created without any channel.
    #[error("at least one channel is required")]
    NoChannels,

    /// Views passed to a builder do not match the channel count.
    #[error("expected {expected} channel views, got {actual}")]
    ChannelCountMismatch {
        /// Expected channel count.
        expected: usize,
        /// Views supplied.
        actual: usize,
    },
}

impl CoreError {
    /// Creates a corrupt record error.
    pub fn corrupt_record(offset: usize, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true for errors caused by a bad configuration rather than bad data.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ChunkOverflow { .. } | Self::InvalidConfig { .. } | Self::NoChannels
        )
    }
}
