//! The worker loop.

use crate::error::WorkerResult;
use crate::graph::SharedGraph;
use crate::sink::MessageSink;
use crate::source::{DataSource, EventBatch, SourceItem};
use crate::store::ResultStore;
use smdflow_protocol::{Message, Transition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters returned by [`Worker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Events run through the graph.
    pub events: u64,
    /// Batches processed.
    pub batches: u64,
    /// Control messages forwarded.
    pub forwarded: u64,
    /// Datagram messages sent by collects.
    pub datagrams: u64,
}

/// Runs a graph over the events of one source.
pub struct Worker {
    id: usize,
    source: Box<dyn DataSource>,
    graph: SharedGraph,
    store: ResultStore,
    reconfigure: Arc<AtomicBool>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Creates worker `id` sending its results to `sink`.
    pub fn new(
        id: usize,
        source: Box<dyn DataSource>,
        graph: SharedGraph,
        sink: Box<dyn MessageSink>,
    ) -> Self {
        Self {
            id,
            source,
            graph,
            store: ResultStore::new(sink),
            reconfigure: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Worker id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The graph run by this worker.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Flag that makes the worker reconfigure its graph at the next batch.
    pub fn reconfigure_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reconfigure)
    }

    /// The worker's result store.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Runs until the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the first source, graph, or transport error.
    pub fn run(&mut self) -> WorkerResult<WorkerStats> {
        let mut stats = WorkerStats::default();

        let partition = self.source.partition();
        self.store.message(Transition::allocate(partition.clone()))?;
        for (name, dtype) in partition.iter() {
            self.store.create(name, dtype)?;
        }
        info!("worker {} allocated {} entries", self.id, partition.len());

        while let Some(item) = self.source.next_item()? {
            match item {
                SourceItem::Batch(batch) => {
                    stats.datagrams += self.process(&batch)? as u64;
                    stats.events += batch.len() as u64;
                    stats.batches += 1;
                }
                SourceItem::Forward(message) => {
                    self.forward(&message)?;
                    stats.forwarded += 1;
                }
            }
        }

        info!(
            "worker {} done: {} events in {} batches",
            self.id, stats.events, stats.batches
        );
        Ok(stats)
    }

    fn process(&mut self, batch: &EventBatch) -> WorkerResult<usize> {
        if self.reconfigure.swap(false, Ordering::AcqRel) {
            debug!("worker {} reconfiguring graph", self.id);
            self.graph.lock().configure()?;
        }

        let mut graph = self.graph.lock();
        for event in &batch.events {
            for datagram in &event.datagrams {
                self.store.put_dgram(datagram.clone())?;
            }
            graph.execute(&mut self.store)?;
        }
        drop(graph);

        let sent = self.store.collect()?;
        debug!(
            "worker {} batch of {} events, {} datagrams",
            self.id,
            batch.len(),
            sent
        );
        Ok(sent)
    }

    fn forward(&mut self, message: &Message) -> WorkerResult<()> {
        debug!("worker {} forwarding {:?}", self.id, message);
        self.store.forward(message)
    }
}
