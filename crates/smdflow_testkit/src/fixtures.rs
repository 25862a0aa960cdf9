//! Test fixtures for channels and sources.
//!
//! Provides builders for smd channel streams, in memory or written to
//! temporary files.

use smdflow_core::{encode_record, RecordHeader, TransitionId};
use smdflow_storage::{ChannelSource, FileSource, InMemorySource};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Encodes one record with `payload`.
pub fn record_bytes(timestamp: u64, transition: TransitionId, payload: &[u8]) -> Vec<u8> {
    encode_record(&RecordHeader::new(timestamp, transition), payload)
        .expect("Failed to encode record")
}

/// Encodes one event record whose payload is the timestamp itself.
pub fn event_bytes(timestamp: u64) -> Vec<u8> {
    record_bytes(timestamp, TransitionId::L1Accept, &timestamp.to_le_bytes())
}

/// Builds the byte stream of one channel.
///
/// # Example
///
/// ```rust,ignore
/// let source = ChannelBuilder::new().configure().events(&[1, 2, 4]).source();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelBuilder {
    bytes: Vec<u8>,
    name: Option<String>,
}

impl ChannelBuilder {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the channel.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a `Configure` record at timestamp 0.
    pub fn configure(self) -> Self {
        self.record(0, TransitionId::Configure, b"config")
    }

    /// Appends an arbitrary record.
    pub fn record(mut self, timestamp: u64, transition: TransitionId, payload: &[u8]) -> Self {
        self.bytes
            .extend_from_slice(&record_bytes(timestamp, transition, payload));
        self
    }

    /// Appends an event carrying its timestamp as payload.
    pub fn event(mut self, timestamp: u64) -> Self {
        self.bytes.extend_from_slice(&event_bytes(timestamp));
        self
    }

    /// Appends events at each timestamp.
    pub fn events(self, timestamps: &[u64]) -> Self {
        timestamps.iter().fold(self, |b, ts| b.event(*ts))
    }

    /// Appends an event with `payload`.
    pub fn event_with(self, timestamp: u64, payload: &[u8]) -> Self {
        self.record(timestamp, TransitionId::L1Accept, payload)
    }

    /// Appends a step record.
    pub fn step(self, timestamp: u64, transition: TransitionId) -> Self {
        self.record(timestamp, transition, &[])
    }

    /// Appends raw bytes, e.g. a truncated record.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Returns the encoded stream.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the encoded stream, consuming the builder.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns an ended in-memory source over the stream.
    pub fn source(self) -> Box<dyn ChannelSource> {
        let source = InMemorySource::with_data(self.bytes);
        match self.name {
            Some(name) => Box::new(source.named(name)),
            None => Box::new(source),
        }
    }

    /// Writes the stream to `dir/name` and returns the path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, &self.bytes).expect("Failed to write channel file");
        path
    }
}

/// Turns channel builders into boxed in-memory sources.
pub fn sources(channels: Vec<ChannelBuilder>) -> Vec<Box<dyn ChannelSource>> {
    channels.into_iter().map(ChannelBuilder::source).collect()
}

/// Channels written to a temporary directory.
pub struct TestFiles {
    paths: Vec<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestFiles {
    /// Writes each channel to `chan{i:02}.smd`.
    pub fn write(channels: &[ChannelBuilder]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let paths = channels
            .iter()
            .enumerate()
            .map(|(i, c)| c.write_to(temp_dir.path(), &format!("chan{i:02}.smd")))
            .collect();
        Self {
            paths,
            _temp_dir: temp_dir,
        }
    }

    /// The written files, in channel order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The temporary directory.
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Opens every file as an ended channel source.
    pub fn sources(&self) -> Vec<Box<dyn ChannelSource>> {
        self.paths
            .iter()
            .map(|p| {
                Box::new(FileSource::open(p).expect("Failed to open channel file"))
                    as Box<dyn ChannelSource>
            })
            .collect()
    }
}

/// JSON configuration for a static source producing `entries`.
///
/// Each entry is `(name, dtype)`; array types get a `[2, 2]` shape.
pub fn static_config_json(entries: &[(&str, &str)], heartbeat: u64) -> String {
    let config: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(name, dtype)| {
            let entry = if matches!(*dtype, "ndarray" | "floatarray" | "array") {
                serde_json::json!({ "dtype": dtype, "shape": [2, 2] })
            } else {
                serde_json::json!({ "dtype": dtype })
            };
            ((*name).to_string(), entry)
        })
        .collect();
    serde_json::json!({
        "interval": 0.0,
        "heartbeat": heartbeat,
        "init_time": 0.0,
        "config": config,
    })
    .to_string()
}
