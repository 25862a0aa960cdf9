//! Local runs: worker threads feeding one collector thread.

use crate::collector::{Collector, CollectorStats};
use crate::config::RunConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::graph::GraphSpec;
use crate::listener::GraphListener;
use crate::sink::{frame_queue, ChannelSink, Frame, MessageSink};
use crate::store::ResultStore;
use crate::worker::{Worker, WorkerStats};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Outcome of a [`LocalRun`].
#[derive(Debug)]
pub struct RunReport {
    /// Per-worker counters, in worker order.
    pub workers: Vec<WorkerStats>,
    /// Collector counters.
    pub collector: CollectorStats,
    /// The upstream store after the last message.
    pub upstream: ResultStore,
    /// Graph updates staged by listeners.
    pub graph_updates: usize,
}

impl RunReport {
    /// Events processed by all workers.
    pub fn total_events(&self) -> u64 {
        self.workers.iter().map(|w| w.events).sum()
    }
}

/// Runs workers and a collector on threads connected by a bounded queue.
///
/// Build each worker with a sink from [`LocalRun::sink`], then hand them to
/// [`LocalRun::run`]. Workers that should accept graph updates while running
/// get an update queue from [`LocalRun::listen`].
#[derive(Debug)]
pub struct LocalRun {
    config: RunConfig,
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
    listeners: Vec<GraphListener>,
}

impl LocalRun {
    /// Creates the queue for a run.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] if `config` is invalid.
    pub fn new(config: RunConfig) -> WorkerResult<Self> {
        config.validate()?;
        let (sender, receiver) = frame_queue(config.queue_capacity);
        Ok(Self {
            config,
            sender,
            receiver,
            listeners: Vec::new(),
        })
    }

    /// The run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// A sink sending into the collector queue.
    pub fn sink(&self) -> ChannelSink {
        ChannelSink::new(self.sender.clone(), self.config.overflow)
    }

    /// Spawns a listener staging graph updates for `worker`.
    ///
    /// Updates sent on the returned queue take effect at the worker's next
    /// batch. The listener stops when the run ends.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Io`] if the listener thread cannot be spawned.
    pub fn listen(&mut self, worker: &Worker) -> WorkerResult<Sender<GraphSpec>> {
        let (updates, receiver) = unbounded();
        let listener = GraphListener::spawn(
            &format!("worker-{}", worker.id()),
            Arc::clone(worker.graph()),
            worker.reconfigure_flag(),
            receiver,
        )?;
        self.listeners.push(listener);
        Ok(updates)
    }

    /// Runs `workers` to completion and merges their output into `upstream`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Config`] if the number of workers differs from
    /// the configuration, otherwise the first worker error, then any
    /// collector error. A panicking thread yields
    /// [`WorkerError::ThreadPanicked`].
    pub fn run(self, workers: Vec<Worker>, upstream: Box<dyn MessageSink>) -> WorkerResult<RunReport> {
        let Self {
            config,
            sender,
            receiver,
            listeners,
        } = self;
        if workers.len() != config.num_workers {
            return Err(WorkerError::config(format!(
                "expected {} workers, got {}",
                config.num_workers,
                workers.len()
            )));
        }
        drop(sender);

        let mut collector = Collector::new(config.num_workers, ResultStore::new(upstream))?;
        let collector_handle = thread::Builder::new()
            .name("collector".to_string())
            .spawn(move || -> WorkerResult<(CollectorStats, ResultStore)> {
                let stats = collector.run(&receiver)?;
                Ok((stats, collector.into_upstream()))
            })?;

        let mut handles: Vec<(String, JoinHandle<WorkerResult<WorkerStats>>)> = Vec::new();
        for mut worker in workers {
            let name = format!("worker-{}", worker.id());
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run())?;
            handles.push((name, handle));
        }
        info!("started {} workers", handles.len());

        let mut stats = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (name, handle) in handles {
            match join(&name, handle) {
                Ok(s) => stats.push(s),
                Err(e) => {
                    warn!("{} failed: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let mut graph_updates = 0;
        for listener in listeners {
            match listener.join() {
                Some(n) => graph_updates += n,
                None => warn!("graph listener panicked"),
            }
        }

        let collected = join("collector", collector_handle);
        if let Some(e) = first_error {
            return Err(e);
        }
        let (collector, upstream) = collected?;
        Ok(RunReport {
            workers: stats,
            collector,
            upstream,
            graph_updates,
        })
    }
}

fn join<T>(name: &str, handle: JoinHandle<WorkerResult<T>>) -> WorkerResult<T> {
    handle
        .join()
        .map_err(|_| WorkerError::ThreadPanicked(name.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{shared, AccumulateGraph};
    use crate::sink::MemorySink;
    use crate::source::{StaticConfig, StaticSource};

    #[test]
    fn worker_count_must_match() {
        let run = LocalRun::new(RunConfig::new(2)).unwrap();
        let err = run.run(Vec::new(), Box::new(MemorySink::new())).unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(LocalRun::new(RunConfig::new(0)).is_err());
        assert!(LocalRun::new(RunConfig::new(1).with_queue_capacity(0)).is_err());
    }

    #[test]
    fn single_worker_run() {
        let config = StaticConfig::from_json(
            r#"{"interval": 0, "heartbeat": 5, "init_time": 0, "config": {"x": {"dtype": "float"}}}"#,
        )
        .unwrap();
        let run = LocalRun::new(RunConfig::new(1).with_queue_capacity(4)).unwrap();
        let source = StaticSource::new(0, &config).unwrap().with_limit(10);
        let worker = Worker::new(
            0,
            Box::new(source),
            shared(AccumulateGraph::default()),
            Box::new(run.sink()),
        );
        let upstream = MemorySink::new();

        let report = run.run(vec![worker], Box::new(upstream.clone())).unwrap();
        assert_eq!(report.total_events(), 10);
        assert_eq!(report.collector.occurrences, 3);
        assert_eq!(
            report.upstream.get("x").unwrap(),
            Some(&smdflow_protocol::Value::Float(4.5))
        );
        assert!(!upstream.is_empty());
    }
}
