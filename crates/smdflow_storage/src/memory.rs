//! In-memory channel source.

use crate::error::{StorageError, StorageResult};
use crate::source::ChannelSource;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    data: Vec<u8>,
    ended: bool,
}

/// An in-memory channel source.
///
/// Suitable for:
/// - Unit and integration tests
/// - In-process producers that hand bytes over through an [`InMemoryWriter`]
///
/// # Thread Safety
///
/// The byte buffer is shared with any writers, so a producer thread can keep
/// appending while a reader drains the source.
///
/// # Example
///
/// ```rust
/// use smdflow_storage::{ChannelSource, InMemorySource};
///
/// let mut source = InMemorySource::with_data(b"abc".to_vec());
/// let mut buf = [0u8; 8];
/// assert_eq!(source.read(&mut buf).unwrap(), 3);
/// assert!(source.is_ended());
/// ```
#[derive(Debug)]
pub struct InMemorySource {
    shared: Arc<RwLock<Shared>>,
    position: usize,
    name: String,
}

/// Producer handle for a live [`InMemorySource`].
#[derive(Debug, Clone)]
pub struct InMemoryWriter {
    shared: Arc<RwLock<Shared>>,
}

impl InMemorySource {
    /// Creates a complete source holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            shared: Arc::new(RwLock::new(Shared { data, ended: true })),
            position: 0,
            name: String::from("memory"),
        }
    }

    /// Creates an empty live source and the writer that feeds it.
    #[must_use]
    pub fn live() -> (Self, InMemoryWriter) {
        let shared = Arc::new(RwLock::new(Shared::default()));
        let source = Self {
            shared: Arc::clone(&shared),
            position: 0,
            name: String::from("memory-live"),
        };
        (source, InMemoryWriter { shared })
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl InMemoryWriter {
    /// Appends bytes to the source.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after [`Self::finish`].
    pub fn append(&self, bytes: &[u8]) -> StorageResult<()> {
        let mut shared = self.shared.write();
        if shared.ended {
            return Err(StorageError::Closed);
        }
        shared.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Signals that no more bytes will be appended.
    pub fn finish(&self) {
        self.shared.write().ended = true;
    }
}

impl ChannelSource for InMemorySource {
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let shared = self.shared.read();
        let available = shared.data.len().saturating_sub(self.position);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&shared.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn is_ended(&self) -> bool {
        let shared = self.shared.read();
        shared.ended && self.position >= shared.data.len()
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
