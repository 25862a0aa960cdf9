//! Merges the output of several workers.

use crate::error::{WorkerError, WorkerResult};
use crate::sink::Frame;
use crate::store::ResultStore;
use crossbeam_channel::Receiver;
use smdflow_protocol::{
    Datagram, Message, Occurrence, OccurrenceKind, Partition, Transition, TransitionKind,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Identifies a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKey {
    /// Transitions of one kind.
    Transition(TransitionKind),
    /// Occurrences of one kind.
    Occurrence(OccurrenceKind),
}

impl From<TransitionKind> for BarrierKey {
    fn from(kind: TransitionKind) -> Self {
        Self::Transition(kind)
    }
}

impl From<OccurrenceKind> for BarrierKey {
    fn from(kind: OccurrenceKind) -> Self {
        Self::Occurrence(kind)
    }
}

/// Counters returned by [`Collector::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Frames received.
    pub frames: u64,
    /// Datagrams merged into the upstream store.
    pub datagrams: u64,
    /// Consolidated transitions forwarded.
    pub transitions: u64,
    /// Consolidated occurrences forwarded.
    pub occurrences: u64,
}

/// Collects worker messages into one upstream store.
///
/// Transitions and occurrences are barriers: each kind is counted until
/// every worker has sent it, then a single message is forwarded upstream
/// and the count restarts. Datagrams are written upstream as they arrive;
/// when workers write the same name the last one received wins.
#[derive(Debug)]
pub struct Collector {
    num_workers: usize,
    upstream: ResultStore,
    counters: HashMap<BarrierKey, usize>,
    partition: Partition,
    stats: CollectorStats,
}

impl Collector {
    /// Creates a collector expecting `num_workers` workers.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] if `num_workers` is zero.
    pub fn new(num_workers: usize, upstream: ResultStore) -> WorkerResult<Self> {
        if num_workers == 0 {
            return Err(WorkerError::config("collector needs at least one worker"));
        }
        Ok(Self {
            num_workers,
            upstream,
            counters: HashMap::new(),
            partition: Partition::new(),
            stats: CollectorStats::default(),
        })
    }

    /// Number of workers expected at every barrier.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Arrivals counted so far for the current round of `key`.
    pub fn pending(&self, key: impl Into<BarrierKey>) -> usize {
        self.counters.get(&key.into()).copied().unwrap_or(0)
    }

    /// The upstream store.
    pub fn upstream(&self) -> &ResultStore {
        &self.upstream
    }

    /// Consumes the collector, returning the upstream store.
    pub fn into_upstream(self) -> ResultStore {
        self.upstream
    }

    /// Counters so far.
    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Handles one message from a worker.
    ///
    /// # Errors
    ///
    /// Returns store errors for conflicting types and transport errors from
    /// the upstream sink.
    pub fn handle(&mut self, message: Message) -> WorkerResult<()> {
        match message {
            Message::Datagram(datagram) => self.merge(datagram),
            Message::Transition(transition) => self.transition(transition),
            Message::Occurrence(occurrence) => self.occurrence(occurrence),
        }
    }

    /// Decodes and handles frames until every sender has disconnected.
    ///
    /// # Errors
    ///
    /// Returns the first decode or handling error.
    pub fn run(&mut self, receiver: &Receiver<Frame>) -> WorkerResult<CollectorStats> {
        for frame in receiver.iter() {
            self.stats.frames += 1;
            let message = Message::decode(&frame)?;
            self.handle(message)?;
        }
        info!(
            "collector done: {} frames, {} datagrams",
            self.stats.frames, self.stats.datagrams
        );
        Ok(self.stats)
    }

    fn merge(&mut self, datagram: Datagram) -> WorkerResult<()> {
        self.upstream.put_dgram(datagram)?;
        self.stats.datagrams += 1;
        Ok(())
    }

    fn arrive(&mut self, key: BarrierKey) -> bool {
        let count = self.counters.entry(key).or_insert(0);
        *count += 1;
        debug!("barrier {:?} at {}/{}", key, count, self.num_workers);
        if *count == self.num_workers {
            *count = 0;
            true
        } else {
            false
        }
    }

    fn transition(&mut self, transition: Transition) -> WorkerResult<()> {
        if let Some(partition) = transition.partition() {
            for (name, dtype) in partition.iter() {
                match self.partition.dtype(name) {
                    Some(existing) if existing != dtype => {
                        return Err(WorkerError::TypeMismatch {
                            name: name.to_string(),
                            expected: existing,
                            actual: dtype,
                        })
                    }
                    Some(_) => {}
                    None => self.partition.push(name, dtype),
                }
            }
        }

        if !self.arrive(BarrierKey::Transition(transition.kind)) {
            return Ok(());
        }

        info!("all {} workers sent {:?}", self.num_workers, transition.kind);
        let consolidated = if transition.kind == TransitionKind::Allocate {
            let partition = std::mem::take(&mut self.partition);
            for (name, dtype) in partition.iter() {
                self.upstream.put_dgram(Datagram::new(name, dtype))?;
            }
            Transition::allocate(partition)
        } else {
            transition
        };
        self.upstream.message(consolidated)?;
        self.stats.transitions += 1;
        Ok(())
    }

    fn occurrence(&mut self, occurrence: Occurrence) -> WorkerResult<()> {
        if !self.arrive(BarrierKey::Occurrence(occurrence.kind)) {
            return Ok(());
        }

        if occurrence.kind == OccurrenceKind::Heartbeat {
            let sent = self.upstream.collect()?;
            debug!("heartbeat flushed {} datagrams", sent);
        } else {
            info!("all {} workers sent {:?}", self.num_workers, occurrence.kind);
        }
        self.upstream.message(occurrence)?;
        self.stats.occurrences += 1;
        Ok(())
    }
}
