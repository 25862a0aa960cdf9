//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The footer sizes do not account for the whole buffer.
    ///
    /// This is the framing-level format error: it means the sender and
    /// receiver disagree on the channel count or the protocol version.
    #[error("packet footer length mismatch: segments + footer = {expected} bytes, buffer has {actual}")]
    LengthMismatch {
        /// Length implied by the footer.
        expected: u64,
        /// Actual buffer length.
        actual: u64,
    },

    /// The buffer is too short to even hold the footer.
    #[error("buffer of {len} bytes too short for a footer of {n_packets} packets")]
    Truncated {
        /// Buffer length.
        len: usize,
        /// Expected packet count.
        n_packets: usize,
    },

    /// A segment cannot be described by a 32-bit size.
    #[error("segment {index} is {len} bytes, larger than the footer can describe")]
    SegmentTooLarge {
        /// Segment position.
        index: usize,
        /// Segment length.
        len: usize,
    },

    /// Packet index out of range for this footer.
    #[error("packet index {index} out of range for {n_packets} packets")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Packet count.
        n_packets: usize,
    },

    /// Failed to encode value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Returns true for framing errors that indicate protocol skew.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::LengthMismatch { .. } | Self::Truncated { .. } | Self::SegmentTooLarge { .. }
        )
    }
}
