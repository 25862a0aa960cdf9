//! Error types for workers and the collector.

use smdflow_protocol::DataType;
use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur in workers and the collector.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A result with this name already exists.
    #[error("result named {0} already exists")]
    DuplicateName(String),

    /// No result with this name.
    #[error("no result named {0}")]
    NotFound(String),

    /// Type of a new value differs from the declared type.
    #[error("type of {name} ({actual}) differs from existing ({expected})")]
    TypeMismatch {
        /// Result name.
        name: String,
        /// Declared type.
        expected: DataType,
        /// Offending type.
        actual: DataType,
    },

    /// Graph configuration or execution failed.
    #[error("graph error: {0}")]
    Graph(String),

    /// The outbound queue is full and the overflow policy is `Fail`.
    #[error("outbound queue full")]
    QueueFull,

    /// The peer end of a queue has gone away.
    #[error("queue disconnected")]
    Disconnected,

    /// Invalid source or run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker or collector thread panicked.
    #[error("thread {0} panicked")]
    ThreadPanicked(String),

    /// Reader error.
    #[error("core error: {0}")]
    Core(#[from] smdflow_core::CoreError),

    /// Frame encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] smdflow_codec::CodecError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a graph error.
    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph(message.into())
    }

    /// Returns true for errors raised by the result store itself.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            WorkerError::DuplicateName(_)
                | WorkerError::NotFound(_)
                | WorkerError::TypeMismatch { .. }
        )
    }

    /// Returns true for queue transport errors.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, WorkerError::QueueFull | WorkerError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(WorkerError::DuplicateName("a".into()).is_store_error());
        assert!(WorkerError::QueueFull.is_transport_error());
        assert!(!WorkerError::config("bad").is_store_error());
    }

    #[test]
    fn error_display() {
        let err = WorkerError::TypeMismatch {
            name: "laser".into(),
            expected: DataType::Int,
            actual: DataType::Text,
        };
        let msg = err.to_string();
        assert!(msg.contains("laser"));
        assert!(msg.contains("int"));
        assert!(msg.contains("text"));
    }
}
