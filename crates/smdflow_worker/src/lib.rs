//! # smdflow workers
//!
//! Workers run a user graph over the events of a data source and send the
//! changed results to a collector, which merges several workers into one
//! upstream store.
//!
//! This crate provides:
//! - [`ResultStore`]: named, typed results with dirty tracking
//! - [`Worker`]: the per-source event loop
//! - [`Collector`]: barrier synchronization and last-write-wins merging
//! - [`StaticSource`] and [`SmdSource`]: data sources
//! - [`LocalRun`]: workers and a collector on threads over a bounded queue
//!
//! # Example
//!
//! ```rust,ignore
//! use smdflow_worker::{shared, AccumulateGraph, LocalRun, MemorySink, RunConfig, StaticConfig, StaticSource, Worker};
//!
//! let config = StaticConfig::from_path("static.json".as_ref())?;
//! let run = LocalRun::new(RunConfig::new(2))?;
//! let workers = (0..2)
//!     .map(|id| {
//!         let source = StaticSource::new(id, &config)?.with_limit(100);
//!         Ok(Worker::new(id, Box::new(source), shared(AccumulateGraph::default()), Box::new(run.sink())))
//!     })
//!     .collect::<smdflow_worker::WorkerResult<Vec<_>>>()?;
//! let report = run.run(workers, Box::new(MemorySink::new()))?;
//! ```
//!
//! # Message flow
//!
//! Every message crossing threads is CBOR-encoded, so the collector always
//! works on its own copy. Transitions and occurrences are forwarded upstream
//! once all workers have sent them; a heartbeat flushes the upstream store
//! first.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod collector;
mod config;
mod error;
mod graph;
mod listener;
mod pipeline;
mod sink;
mod source;
mod store;
mod worker;

pub use collector::{BarrierKey, Collector, CollectorStats};
pub use config::{OverflowPolicy, RunConfig};
pub use error::{WorkerError, WorkerResult};
pub use graph::{shared, AccumulateGraph, Graph, GraphSpec, NodeSpec, Reduce, SharedGraph};
pub use listener::GraphListener;
pub use pipeline::{LocalRun, RunReport};
pub use sink::{frame_queue, ChannelSink, Frame, MemorySink, MessageSink};
pub use source::{
    DataSource, EventBatch, EventData, SmdSource, SourceItem, StaticConfig, StaticEntry,
    StaticSource,
};
pub use store::ResultStore;
pub use worker::{Worker, WorkerStats};
