//! Messages exchanged between workers and the collector.

use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};
use smdflow_codec::{from_cbor, to_cbor, CodecResult};

/// A worker/collector message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A named result value.
    Datagram(Datagram),
    /// A run-control transition.
    Transition(Transition),
    /// An out-of-band notification.
    Occurrence(Occurrence),
}

impl Message {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            Message::Datagram(_) => 1,
            Message::Transition(_) => 2,
            Message::Occurrence(_) => 3,
        }
    }

    /// Encodes to a CBOR frame.
    ///
    /// # Errors
    ///
    /// Returns a codec error if serialization fails.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from a CBOR frame.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the frame is not a valid message.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

impl From<Datagram> for Message {
    fn from(d: Datagram) -> Self {
        Self::Datagram(d)
    }
}

impl From<Transition> for Message {
    fn from(t: Transition) -> Self {
        Self::Transition(t)
    }
}

impl From<Occurrence> for Message {
    fn from(o: Occurrence) -> Self {
        Self::Occurrence(o)
    }
}

/// A named, typed result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datagram {
    /// Unique name within a store.
    pub name: String,
    /// Declared type.
    pub dtype: DataType,
    /// Current value, unset until first written.
    pub value: Option<Value>,
}

impl Datagram {
    /// Creates a datagram without a value.
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            value: None,
        }
    }

    /// Creates a datagram holding `value`, typed after it.
    pub fn with_value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            dtype: value.dtype(),
            value: Some(value),
        }
    }
}

/// Kind of run-control transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Declares the partition.
    Allocate,
    /// Configure.
    Configure,
    /// Enable.
    Enable,
    /// Disable.
    Disable,
    /// Unconfigure.
    Unconfigure,
}

/// Payload carried by a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionPayload {
    /// The declared partition.
    Partition(Partition),
    /// No payload.
    None,
}

/// A run-control transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Transition kind.
    pub kind: TransitionKind,
    /// Payload.
    pub payload: TransitionPayload,
}

impl Transition {
    /// Creates a transition without payload.
    pub fn new(kind: TransitionKind) -> Self {
        Self {
            kind,
            payload: TransitionPayload::None,
        }
    }

    /// Creates an `Allocate` transition declaring `partition`.
    pub fn allocate(partition: Partition) -> Self {
        Self {
            kind: TransitionKind::Allocate,
            payload: TransitionPayload::Partition(partition),
        }
    }

    /// Returns the partition payload, if any.
    pub fn partition(&self) -> Option<&Partition> {
        match &self.payload {
            TransitionPayload::Partition(p) => Some(p),
            TransitionPayload::None => None,
        }
    }
}

/// Kind of occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OccurrenceKind {
    /// Periodic flush marker.
    Heartbeat,
    /// The source has no more data.
    SourceEnded,
}

/// An out-of-band notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Occurrence kind.
    pub kind: OccurrenceKind,
}

impl Occurrence {
    /// Creates a heartbeat.
    pub fn heartbeat() -> Self {
        Self {
            kind: OccurrenceKind::Heartbeat,
        }
    }

    /// Creates a source-ended notification.
    pub fn source_ended() -> Self {
        Self {
            kind: OccurrenceKind::SourceEnded,
        }
    }
}

/// Ordered (name, type) pairs declaring the entries of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    entries: Vec<(String, DataType)>,
}

impl Partition {
    /// Creates an empty partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, dtype: DataType) -> Self {
        self.push(name, dtype);
        self
    }

    /// Appends an entry.
    pub fn push(&mut self, name: impl Into<String>, dtype: DataType) {
        self.entries.push((name.into(), dtype));
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, DataType)> + '_ {
        self.entries.iter().map(|(n, t)| (n.as_str(), *t))
    }

    /// Declared type of `name`.
    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, DataType)> for Partition {
    fn from_iter<I: IntoIterator<Item = (String, DataType)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_roundtrip() {
        let msg = Message::from(Datagram::with_value("sum", Value::Float(2.5)));
        let bytes = msg.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn allocate_carries_partition() {
        let partition = Partition::new()
            .with("cspad", DataType::FloatArray)
            .with("laser", DataType::Int);
        let msg = Message::from(Transition::allocate(partition.clone()));

        let Message::Transition(t) = Message::decode(&msg.encode().unwrap()).unwrap() else {
            panic!("expected transition");
        };
        assert_eq!(t.kind, TransitionKind::Allocate);
        let decoded = t.partition().unwrap();
        assert_eq!(decoded, &partition);
        let names: Vec<&str> = decoded.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["cspad", "laser"]);
        assert_eq!(decoded.dtype("laser"), Some(DataType::Int));
    }

    #[test]
    fn plain_transition_has_no_partition() {
        let t = Transition::new(TransitionKind::Enable);
        assert!(t.partition().is_none());
    }

    #[test]
    fn occurrence_roundtrip() {
        let msg = Message::from(Occurrence::source_ended());
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Message::decode(&[0xff, 0x00, 0x13]).is_err());
    }

    #[test]
    fn message_type_codes() {
        assert_eq!(Message::from(Datagram::new("a", DataType::Int)).type_code(), 1);
        assert_eq!(Message::from(Transition::new(TransitionKind::Configure)).type_code(), 2);
        assert_eq!(Message::from(Occurrence::heartbeat()).type_code(), 3);
    }

    #[test]
    fn partition_from_iter() {
        let p: Partition = vec![("a".to_string(), DataType::Text)].into_iter().collect();
        assert_eq!(p.len(), 1);
        assert!(!p.is_empty());
        assert!(Partition::new().is_empty());
    }
}
