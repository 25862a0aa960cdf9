//! Channel source trait definition.

use crate::error::StorageResult;

/// A single channel of raw record bytes.
///
/// Sources are **opaque byte streams**. They know nothing about record
/// framing; the reader on top of them owns all interpretation.
///
/// # Invariants
///
/// - Bytes are delivered in order, each exactly once
/// - `read` returning `Ok(0)` with `is_ended() == false` is a transient
///   stall (more bytes may arrive later)
/// - Once `is_ended()` is true, every later `read` returns `Ok(0)`
///
/// # Implementors
///
/// - [`super::InMemorySource`] - For tests and in-process producers
/// - [`super::FileSource`] - For smd files, complete or still growing
pub trait ChannelSource: Send {
    /// Reads up to `buf.len()` bytes into `buf`, returning how many were read.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize>;

    /// Returns true once no more bytes will ever be delivered.
    fn is_ended(&self) -> bool;

    /// Total bytes delivered so far.
    fn position(&self) -> u64;

    /// Human-readable name for logs.
    fn name(&self) -> String {
        String::from("channel")
    }
}

impl<S: ChannelSource + ?Sized> ChannelSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        (**self).read(buf)
    }

    fn is_ended(&self) -> bool {
        (**self).is_ended()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
