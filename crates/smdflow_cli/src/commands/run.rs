//! Run command implementation.

use super::OutputFormat;
use crossbeam_channel::Sender;
use smdflow_protocol::Message;
use smdflow_worker::{
    shared, AccumulateGraph, GraphSpec, LocalRun, MessageSink, RunConfig, StaticConfig,
    StaticSource, Worker, WorkerResult,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Options of the run command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Per-worker event limit.
    pub max_events: Option<u64>,
    /// Graph specification file.
    pub graph: Option<PathBuf>,
    /// Collector queue capacity.
    pub queue_capacity: usize,
    /// Read graph updates from stdin while running.
    pub graph_updates: bool,
    /// Output format.
    pub format: OutputFormat,
}

/// A data source named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Synthetic source configured by a JSON file.
    Static(PathBuf),
}

/// Errors in the source argument.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SourceSpecError {
    /// The scheme is not supported.
    #[error("unsupported source scheme in {0} (expected static://config.json)")]
    UnknownScheme(String),

    /// The scheme has no path.
    #[error("missing path in {0}")]
    MissingPath(String),
}

impl SourceSpec {
    /// Parses `scheme://path`.
    pub fn parse(source: &str) -> Result<Self, SourceSpecError> {
        match source.split_once("://") {
            Some(("static", "")) => Err(SourceSpecError::MissingPath(source.to_string())),
            Some(("static", path)) => Ok(Self::Static(PathBuf::from(path))),
            _ => Err(SourceSpecError::UnknownScheme(source.to_string())),
        }
    }
}

/// Prints upstream messages to stdout.
pub struct PrintSink<W: Write + Send> {
    out: W,
    format: OutputFormat,
}

impl<W: Write + Send> PrintSink<W> {
    /// Creates a sink writing to `out`.
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }
}

impl<W: Write + Send> MessageSink for PrintSink<W> {
    fn send(&mut self, message: &Message) -> WorkerResult<()> {
        match self.format {
            OutputFormat::Json => {
                let line = serde_json::to_string(message)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writeln!(self.out, "{}", line)?;
            }
            OutputFormat::Text => match message {
                Message::Datagram(d) => match &d.value {
                    Some(value) => writeln!(self.out, "{} ({}) = {}", d.name, d.dtype, value)?,
                    None => writeln!(self.out, "{} ({}) unset", d.name, d.dtype)?,
                },
                Message::Transition(t) => match t.partition() {
                    Some(p) => writeln!(self.out, "transition {:?} ({} entries)", t.kind, p.len())?,
                    None => writeln!(self.out, "transition {:?}", t.kind)?,
                },
                Message::Occurrence(o) => writeln!(self.out, "occurrence {:?}", o.kind)?,
            },
        }
        Ok(())
    }
}

fn load_graph(path: Option<&Path>) -> Result<GraphSpec, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(GraphSpec::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(GraphSpec::default()),
    }
}

/// Broadcasts graph specifications read from `input`, one JSON document per
/// line, to every queue in `senders`.
///
/// Returns the thread handle; it yields the number of accepted updates once
/// `input` ends.
pub fn forward_graph_updates<R: BufRead + Send + 'static>(
    input: R,
    senders: Vec<Sender<GraphSpec>>,
) -> std::io::Result<JoinHandle<usize>> {
    thread::Builder::new()
        .name("graph-updates".to_string())
        .spawn(move || {
            let mut accepted = 0;
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stopped reading graph updates: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match GraphSpec::from_json(&line) {
                    Ok(spec) => {
                        accepted += 1;
                        for sender in &senders {
                            if sender.send(spec.clone()).is_err() {
                                debug!("graph listener already stopped");
                            }
                        }
                    }
                    Err(e) => warn!("ignoring graph update: {}", e),
                }
            }
            accepted
        })
}

/// Runs the run command.
pub fn run(source: &str, options: &RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let SourceSpec::Static(config_path) = SourceSpec::parse(source)?;
    let config = StaticConfig::from_path(&config_path)?;
    let spec = load_graph(options.graph.as_deref())?;

    let run_config = RunConfig::new(options.num_workers).with_queue_capacity(options.queue_capacity);
    let mut local = LocalRun::new(run_config)?;

    let mut workers = Vec::with_capacity(options.num_workers);
    let mut updates = Vec::new();
    for id in 0..options.num_workers {
        let mut source = StaticSource::new(id, &config)?;
        if let Some(limit) = options.max_events {
            source = source.with_limit(limit);
        }
        let graph = shared(AccumulateGraph::new(spec.clone())?);
        let worker = Worker::new(id, Box::new(source), graph, Box::new(local.sink()));
        if options.graph_updates {
            updates.push(local.listen(&worker)?);
        }
        workers.push(worker);
    }
    if options.graph_updates {
        // Detached: stdin may stay open after the run ends.
        forward_graph_updates(std::io::BufReader::new(std::io::stdin()), updates)?;
    }

    info!("running {} workers on {:?}", options.num_workers, config_path);
    let upstream = PrintSink::new(std::io::stdout(), options.format);
    let report = local.run(workers, Box::new(upstream))?;
    info!(
        "processed {} events, forwarded {} transitions, applied {} graph updates",
        report.total_events(),
        report.collector.transitions,
        report.graph_updates
    );

    Ok(())
}
