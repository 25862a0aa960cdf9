//! Event sources feeding a worker.

use crate::error::{WorkerError, WorkerResult};
use serde::Deserialize;
use smdflow_core::{Event, SmdReaderManager, TransitionId};
use smdflow_protocol::{
    DataType, Datagram, Message, Occurrence, Partition, Transition, TransitionKind, Value,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// One event as a list of datagrams.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    /// Event timestamp.
    pub timestamp: u64,
    /// Values contributed by the event.
    pub datagrams: Vec<Datagram>,
}

/// Owned events handed to a worker in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    /// Events in timestamp order.
    pub events: Vec<EventData>,
}

impl EventBatch {
    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the batch has no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Item produced by a [`DataSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    /// Events to run through the graph.
    Batch(EventBatch),
    /// A control message to forward unchanged.
    Forward(Message),
}

/// Produces the input of a worker.
pub trait DataSource: Send {
    /// Entries the source will write, declared before any event.
    fn partition(&self) -> Partition;

    /// Returns the next item, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying data cannot be read.
    fn next_item(&mut self) -> WorkerResult<Option<SourceItem>>;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    fn partition(&self) -> Partition {
        (**self).partition()
    }

    fn next_item(&mut self) -> WorkerResult<Option<SourceItem>> {
        (**self).next_item()
    }
}

/// One entry of a static source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticEntry {
    /// Type name (`int`, `float`, `text`, `bytes`, `floatarray`/`ndarray`).
    pub dtype: String,
    /// Array shape for array types.
    #[serde(default)]
    pub shape: Option<Vec<usize>>,
}

/// Configuration of a [`StaticSource`], usually read from JSON.
///
/// ```json
/// {
///   "interval": 0.01,
///   "heartbeat": 10,
///   "init_time": 0.5,
///   "config": { "laser": { "dtype": "int" }, "cspad": { "dtype": "ndarray", "shape": [4, 4] } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StaticConfig {
    /// Seconds between events.
    pub interval: f64,
    /// Emit a heartbeat every this many events (0 = never).
    pub heartbeat: u64,
    /// Seconds to wait before the first event.
    pub init_time: f64,
    /// Entries produced by every event.
    pub config: BTreeMap<String, StaticEntry>,
    /// Stop after this many events.
    #[serde(default)]
    pub events: Option<u64>,
}

impl StaticConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] for malformed JSON.
    pub fn from_json(json: &str) -> WorkerResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| WorkerError::config(format!("problem parsing static source config: {e}")))
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> WorkerResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            WorkerError::config(format!("problem opening {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Clone)]
struct StaticField {
    name: String,
    dtype: DataType,
    len: usize,
}

/// A synthetic source producing deterministic values.
///
/// Emits a `Configure` transition, then one single-event batch per
/// interval, a heartbeat every `heartbeat` events, and `SourceEnded` once
/// the event limit is reached.
#[derive(Debug)]
pub struct StaticSource {
    id: usize,
    fields: Vec<StaticField>,
    interval: Duration,
    init_time: Duration,
    heartbeat: u64,
    limit: Option<u64>,
    count: u64,
    started: bool,
    finished: bool,
    pending: VecDeque<SourceItem>,
}

impl StaticSource {
    /// Creates a source for worker `id`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] for unknown type names or negative
    /// durations.
    pub fn new(id: usize, config: &StaticConfig) -> WorkerResult<Self> {
        let fields = config
            .config
            .iter()
            .map(|(name, entry)| {
                let dtype = DataType::from_name(&entry.dtype).ok_or_else(|| {
                    WorkerError::config(format!("unknown dtype {} for {name}", entry.dtype))
                })?;
                let len = entry
                    .shape
                    .as_ref()
                    .map_or(1, |shape| shape.iter().product());
                Ok(StaticField {
                    name: name.clone(),
                    dtype,
                    len,
                })
            })
            .collect::<WorkerResult<Vec<_>>>()?;

        Ok(Self {
            id,
            fields,
            interval: seconds(config.interval, "interval")?,
            init_time: seconds(config.init_time, "init_time")?,
            heartbeat: config.heartbeat,
            limit: config.events,
            count: 0,
            started: false,
            finished: false,
            pending: VecDeque::new(),
        })
    }

    /// Limits the number of events.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Events produced so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn value(&self, field: &StaticField) -> Value {
        let n = self.count;
        match field.dtype {
            DataType::Int => Value::Int(n as i64 + self.id as i64),
            DataType::Float => Value::Float(n as f64 * 0.5),
            DataType::Text => Value::Text(format!("worker{:03}-event{n}", self.id)),
            DataType::Bytes => Value::Bytes(n.to_le_bytes().to_vec()),
            DataType::FloatArray => Value::FloatArray(vec![n as f64; field.len]),
        }
    }

    fn event(&self) -> EventData {
        EventData {
            timestamp: self.count,
            datagrams: self
                .fields
                .iter()
                .map(|f| Datagram::with_value(f.name.clone(), self.value(f)))
                .collect(),
        }
    }
}

fn seconds(value: f64, field: &str) -> WorkerResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| WorkerError::config(format!("{field} must be a non-negative number of seconds")))
}

impl DataSource for StaticSource {
    fn partition(&self) -> Partition {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.dtype))
            .collect()
    }

    fn next_item(&mut self) -> WorkerResult<Option<SourceItem>> {
        if let Some(item) = self.pending.pop_front() {
            return Ok(Some(item));
        }
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            if !self.init_time.is_zero() {
                thread::sleep(self.init_time);
            }
            return Ok(Some(SourceItem::Forward(Message::from(Transition::new(
                TransitionKind::Configure,
            )))));
        }
        if self.limit.is_some_and(|limit| self.count >= limit) {
            self.finished = true;
            return Ok(Some(SourceItem::Forward(Message::from(
                Occurrence::source_ended(),
            ))));
        }

        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        let event = self.event();
        self.count += 1;
        if self.heartbeat > 0 && self.count % self.heartbeat == 0 {
            self.pending
                .push_back(SourceItem::Forward(Message::from(Occurrence::heartbeat())));
        }
        Ok(Some(SourceItem::Batch(EventBatch {
            events: vec![event],
        })))
    }
}

fn step_transition(id: TransitionId) -> Option<TransitionKind> {
    match id {
        TransitionId::Configure => Some(TransitionKind::Configure),
        TransitionId::Unconfigure => Some(TransitionKind::Unconfigure),
        TransitionId::Enable => Some(TransitionKind::Enable),
        TransitionId::Disable => Some(TransitionKind::Disable),
        _ => None,
    }
}

/// Adapts an [`SmdReaderManager`] to a worker.
///
/// Channel `i` becomes a `Bytes` entry named `channel_names[i]` holding the
/// record payload. Step records mapping to a run-control transition are
/// forwarded ahead of the batch they arrive with; a heartbeat follows every
/// released window.
#[derive(Debug)]
pub struct SmdSource {
    manager: SmdReaderManager,
    names: Vec<String>,
    started: bool,
    finished: bool,
    pending: VecDeque<SourceItem>,
}

impl SmdSource {
    /// Creates a source over `manager`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] if `names` does not match the
    /// channel count.
    pub fn new(manager: SmdReaderManager, names: Vec<String>) -> WorkerResult<Self> {
        if names.len() != manager.n_channels() {
            return Err(WorkerError::config(format!(
                "{} channel names for {} channels",
                names.len(),
                manager.n_channels()
            )));
        }
        Ok(Self {
            manager,
            names,
            started: false,
            finished: false,
            pending: VecDeque::new(),
        })
    }

    /// Creates a source naming channels `chan00`, `chan01`, ...
    pub fn with_default_names(manager: SmdReaderManager) -> Self {
        let names = (0..manager.n_channels()).map(|i| format!("chan{i:02}")).collect();
        Self {
            manager,
            names,
            started: false,
            finished: false,
            pending: VecDeque::new(),
        }
    }

    /// The wrapped manager.
    pub fn manager(&self) -> &SmdReaderManager {
        &self.manager
    }

    fn event_data(names: &[String], event: &Event<'_>) -> EventData {
        EventData {
            timestamp: event.timestamp,
            datagrams: event
                .records
                .iter()
                .zip(names)
                .filter_map(|(record, name)| {
                    record.map(|r| Datagram::with_value(name.clone(), Value::Bytes(r.payload().to_vec())))
                })
                .collect(),
        }
    }

    fn fill(&mut self) -> WorkerResult<()> {
        let Some(batches) = self.manager.next_batch_iter()? else {
            info!(
                "smd source exhausted after {} events",
                self.manager.processed_events()
            );
            self.finished = true;
            self.pending
                .push_back(SourceItem::Forward(Message::from(Occurrence::source_ended())));
            return Ok(());
        };

        let mut items = Vec::new();
        for batch in batches {
            for step in &batch.steps {
                let kind = step
                    .records
                    .iter()
                    .flatten()
                    .find_map(|r| step_transition(r.header.transition));
                if let Some(kind) = kind {
                    items.push(SourceItem::Forward(Message::from(Transition::new(kind))));
                }
            }
            let events: Vec<EventData> = batch
                .events
                .iter()
                .map(|e| Self::event_data(&self.names, e))
                .collect();
            if !events.is_empty() {
                items.push(SourceItem::Batch(EventBatch { events }));
            }
        }
        debug!("smd window produced {} items", items.len());
        self.pending.extend(items);
        self.pending
            .push_back(SourceItem::Forward(Message::from(Occurrence::heartbeat())));
        Ok(())
    }
}

impl DataSource for SmdSource {
    fn partition(&self) -> Partition {
        self.names
            .iter()
            .map(|n| (n.clone(), DataType::Bytes))
            .collect()
    }

    fn next_item(&mut self) -> WorkerResult<Option<SourceItem>> {
        if !self.started {
            self.started = true;
            if self.manager.get_next_dgrams()?.is_some() {
                return Ok(Some(SourceItem::Forward(Message::from(Transition::new(
                    TransitionKind::Configure,
                )))));
            }
        }
        while self.pending.is_empty() && !self.finished {
            self.fill()?;
        }
        Ok(self.pending.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "interval": 0,
        "heartbeat": 2,
        "init_time": 0,
        "config": {
            "laser": {"dtype": "int"},
            "cspad": {"dtype": "ndarray", "shape": [2, 3]}
        }
    }"#;

    fn drain(source: &mut dyn DataSource) -> Vec<SourceItem> {
        let mut items = Vec::new();
        while let Some(item) = source.next_item().unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn static_source_sequence() {
        let config = StaticConfig::from_json(CONFIG).unwrap();
        let mut source = StaticSource::new(1, &config).unwrap().with_limit(3);

        let partition = source.partition();
        let names: Vec<&str> = partition.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["cspad", "laser"]);
        assert_eq!(partition.dtype("cspad"), Some(DataType::FloatArray));

        let items = drain(&mut source);
        let summary: Vec<&str> = items
            .iter()
            .map(|i| match i {
                SourceItem::Batch(_) => "batch",
                SourceItem::Forward(Message::Transition(_)) => "transition",
                SourceItem::Forward(Message::Occurrence(o)) if o.kind == smdflow_protocol::OccurrenceKind::Heartbeat => "heartbeat",
                SourceItem::Forward(Message::Occurrence(_)) => "ended",
                SourceItem::Forward(Message::Datagram(_)) => "datagram",
            })
            .collect();
        assert_eq!(
            summary,
            vec!["transition", "batch", "batch", "heartbeat", "batch", "ended"]
        );

        let SourceItem::Batch(batch) = &items[1] else {
            panic!("expected batch");
        };
        let event = &batch.events[0];
        assert_eq!(event.datagrams.len(), 2);
        assert_eq!(event.datagrams[0].value, Some(Value::FloatArray(vec![0.0; 6])));
        assert_eq!(event.datagrams[1].value, Some(Value::Int(1)));
    }

    #[test]
    fn static_config_errors() {
        assert!(matches!(
            StaticConfig::from_json("{\"interval\": 1"),
            Err(WorkerError::Config(_))
        ));

        let bad_type = StaticConfig::from_json(
            r#"{"interval": 0, "heartbeat": 0, "init_time": 0, "config": {"x": {"dtype": "complex"}}}"#,
        )
        .unwrap();
        assert!(matches!(
            StaticSource::new(0, &bad_type),
            Err(WorkerError::Config(_))
        ));

        let negative = StaticConfig::from_json(
            r#"{"interval": -1, "heartbeat": 0, "init_time": 0, "config": {}}"#,
        )
        .unwrap();
        assert!(StaticSource::new(0, &negative).is_err());
    }

    #[test]
    fn static_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.json");
        std::fs::write(&path, CONFIG).unwrap();
        let config = StaticConfig::from_path(&path).unwrap();
        assert_eq!(config.heartbeat, 2);
        assert!(StaticConfig::from_path(&dir.path().join("missing.json")).is_err());
    }
}
