//! Named result storage with dirty tracking.

use crate::error::{WorkerError, WorkerResult};
use crate::sink::MessageSink;
use smdflow_protocol::{DataType, Datagram, Message, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry {
    datagram: Datagram,
    dirty: bool,
}

/// Holds named results and sends the changed ones downstream.
///
/// Each name keeps the type it was created with. [`ResultStore::collect`]
/// emits one [`Datagram`] message per entry written since the last collect,
/// in name order.
pub struct ResultStore {
    entries: BTreeMap<String, Entry>,
    sink: Box<dyn MessageSink>,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl ResultStore {
    /// Creates an empty store sending to `sink`.
    pub fn new(sink: Box<dyn MessageSink>) -> Self {
        Self {
            entries: BTreeMap::new(),
            sink,
        }
    }

    /// Declares a result without a value.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::DuplicateName`] if `name` exists.
    pub fn create(&mut self, name: &str, dtype: DataType) -> WorkerResult<()> {
        if self.entries.contains_key(name) {
            return Err(WorkerError::DuplicateName(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            Entry {
                datagram: Datagram::new(name, dtype),
                dirty: false,
            },
        );
        Ok(())
    }

    /// Writes a value, creating the entry if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::TypeMismatch`] if `value` is not of `dtype`,
    /// or `dtype` differs from the entry's declared type. The store is left
    /// unchanged.
    pub fn put(&mut self, name: &str, dtype: DataType, value: Value) -> WorkerResult<()> {
        if value.dtype() != dtype {
            return Err(WorkerError::TypeMismatch {
                name: name.to_string(),
                expected: dtype,
                actual: value.dtype(),
            });
        }

        match self.entries.get_mut(name) {
            Some(entry) if entry.datagram.dtype != dtype => Err(WorkerError::TypeMismatch {
                name: name.to_string(),
                expected: entry.datagram.dtype,
                actual: dtype,
            }),
            Some(entry) => {
                entry.datagram.value = Some(value);
                entry.dirty = true;
                Ok(())
            }
            None => {
                self.entries.insert(
                    name.to_string(),
                    Entry {
                        datagram: Datagram {
                            name: name.to_string(),
                            dtype,
                            value: Some(value),
                        },
                        dirty: true,
                    },
                );
                Ok(())
            }
        }
    }

    /// Writes a datagram.
    ///
    /// A datagram without a value only declares the entry.
    ///
    /// # Errors
    ///
    /// Same as [`Self::put`].
    pub fn put_dgram(&mut self, datagram: Datagram) -> WorkerResult<()> {
        let Datagram { name, dtype, value } = datagram;
        match value {
            Some(value) => self.put(&name, dtype, value),
            None => match self.entries.get(&name) {
                Some(entry) if entry.datagram.dtype != dtype => Err(WorkerError::TypeMismatch {
                    name,
                    expected: entry.datagram.dtype,
                    actual: dtype,
                }),
                Some(_) => Ok(()),
                None => self.create(&name, dtype),
            },
        }
    }

    /// Returns the current value of `name`, `None` if never written.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NotFound`] if `name` does not exist.
    pub fn get(&self, name: &str) -> WorkerResult<Option<&Value>> {
        Ok(self.get_full(name)?.value.as_ref())
    }

    /// Returns the full datagram of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NotFound`] if `name` does not exist.
    pub fn get_full(&self, name: &str) -> WorkerResult<&Datagram> {
        self.entries
            .get(name)
            .map(|e| &e.datagram)
            .ok_or_else(|| WorkerError::NotFound(name.to_string()))
    }

    /// Returns the declared type of `name`, if it exists.
    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.entries.get(name).map(|e| e.datagram.dtype)
    }

    /// Returns true if `name` was written since the last collect.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.dirty)
    }

    /// Sends every entry written since the last collect.
    ///
    /// Returns the number of messages sent.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the sink. Entries not yet sent stay
    /// dirty.
    pub fn collect(&mut self) -> WorkerResult<usize> {
        let mut sent = 0;
        for entry in self.entries.values_mut().filter(|e| e.dirty) {
            self.sink
                .send(&Message::Datagram(entry.datagram.clone()))?;
            entry.dirty = false;
            sent += 1;
        }
        Ok(sent)
    }

    /// Sends `message` unchanged.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the sink.
    pub fn forward(&mut self, message: &Message) -> WorkerResult<()> {
        self.sink.send(message)
    }

    /// Wraps `payload` in a message and sends it.
    ///
    /// # Errors
    ///
    /// Returns a transport error from the sink.
    pub fn message(&mut self, payload: impl Into<Message>) -> WorkerResult<()> {
        self.sink.send(&payload.into())
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }
}
