//! Integration tests for workers, sources and the collector.

use crossbeam_channel::{bounded, Receiver, Sender};
use smdflow_core::{PipelineConfig, SmdReaderManager};
use smdflow_protocol::{
    DataType, Datagram, Message, Occurrence, OccurrenceKind, Partition, TransitionKind, Value,
};
use smdflow_testkit::{sources, static_config_json, ChannelBuilder, JoinHarness, TestFiles};
use smdflow_worker::{
    shared, AccumulateGraph, Collector, DataSource, GraphSpec, LocalRun, MemorySink, Reduce,
    EventBatch, EventData, ResultStore, RunConfig, SmdSource, SourceItem, StaticConfig,
    StaticSource, Worker, WorkerResult,
};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

fn kinds(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| match m {
            Message::Datagram(d) => format!("dgram:{}", d.name),
            Message::Transition(t) => format!("{:?}", t.kind),
            Message::Occurrence(o) => format!("{:?}", o.kind),
        })
        .collect()
}

#[test]
fn three_static_workers_merge_upstream() {
    let config =
        StaticConfig::from_json(&static_config_json(&[("laser", "int")], 2)).unwrap();
    let run = LocalRun::new(RunConfig::new(3).with_queue_capacity(2)).unwrap();
    let workers = (0..3)
        .map(|id| {
            let source = StaticSource::new(id, &config).unwrap().with_limit(6);
            let graph = shared(
                AccumulateGraph::new(GraphSpec::default().node("laser", "laser_n", Reduce::Count))
                    .unwrap(),
            );
            Worker::new(id, Box::new(source), graph, Box::new(run.sink()))
        })
        .collect();
    let upstream = MemorySink::new();

    let report = run.run(workers, Box::new(upstream.clone())).unwrap();
    assert_eq!(report.total_events(), 18);
    assert_eq!(report.collector.transitions, 2);
    assert_eq!(report.collector.occurrences, 4);

    let messages = upstream.take();
    let mut expected = vec!["Allocate".to_string(), "Configure".to_string()];
    for _ in 0..3 {
        expected.push("dgram:laser".into());
        expected.push("dgram:laser_n".into());
        expected.push("Heartbeat".into());
    }
    expected.push("SourceEnded".into());
    assert_eq!(kinds(&messages), expected);

    let Message::Transition(allocate) = &messages[0] else {
        panic!("expected allocate");
    };
    assert_eq!(
        allocate.partition().and_then(|p| p.dtype("laser")),
        Some(DataType::Int)
    );

    // Workers write overlapping names, so the survivor is any worker's last value.
    let laser = report.upstream.get("laser").unwrap().and_then(Value::as_int);
    assert!(matches!(laser, Some(5..=7)), "laser = {laser:?}");
    assert_eq!(report.upstream.get("laser_n").unwrap(), Some(&Value::Int(6)));
}

/// Emits one heartbeat-terminated batch per value. Before the batch at
/// index `hold` it signals `reached` and waits on `gate`.
struct GatedSource {
    items: VecDeque<SourceItem>,
    batches: usize,
    hold: usize,
    reached: Sender<()>,
    gate: Receiver<()>,
}

impl GatedSource {
    fn new(values: &[i64], hold: usize, reached: Sender<()>, gate: Receiver<()>) -> Self {
        let items = values
            .iter()
            .enumerate()
            .flat_map(|(i, v)| {
                [
                    SourceItem::Batch(EventBatch {
                        events: vec![EventData {
                            timestamp: i as u64,
                            datagrams: vec![Datagram::with_value("laser", Value::Int(*v))],
                        }],
                    }),
                    SourceItem::Forward(Message::from(Occurrence::heartbeat())),
                ]
            })
            .collect();
        Self {
            items,
            batches: 0,
            hold,
            reached,
            gate,
        }
    }
}

impl DataSource for GatedSource {
    fn partition(&self) -> Partition {
        Partition::new().with("laser", DataType::Int)
    }

    fn next_item(&mut self) -> WorkerResult<Option<SourceItem>> {
        let item = self.items.pop_front();
        if let Some(SourceItem::Batch(_)) = &item {
            if self.batches == self.hold {
                let _ = self.reached.send(());
                let _ = self.gate.recv();
            }
            self.batches += 1;
        }
        Ok(item)
    }
}

#[test]
fn graph_update_applies_between_batches() {
    let (reached, parked) = bounded(1);
    let (open, gate) = bounded(0);
    let mut run = LocalRun::new(RunConfig::new(1).with_queue_capacity(4)).unwrap();
    let graph = shared(
        AccumulateGraph::new(GraphSpec::default().node("laser", "laser_sum", Reduce::Sum)).unwrap(),
    );
    let worker = Worker::new(
        0,
        Box::new(GatedSource::new(&[1, 2, 3, 4], 2, reached, gate)),
        graph,
        Box::new(run.sink()),
    );
    let updates = run.listen(&worker).unwrap();
    let flag = worker.reconfigure_flag();
    let upstream = MemorySink::new();

    let sink = upstream.clone();
    let handle = thread::spawn(move || run.run(vec![worker], Box::new(sink)));

    parked.recv().unwrap();
    updates
        .send(GraphSpec::default().node("laser", "laser_n", Reduce::Count))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.load(Ordering::Acquire) {
        assert!(Instant::now() < deadline, "update never staged");
        thread::sleep(Duration::from_millis(1));
    }
    open.send(()).unwrap();

    let report = handle.join().unwrap().unwrap();
    assert_eq!(report.graph_updates, 1);
    assert_eq!(report.total_events(), 4);

    // One segment of datagrams per batch, closed by its heartbeat.
    let mut segments: Vec<Vec<String>> = vec![Vec::new()];
    for message in upstream.take() {
        match message {
            Message::Datagram(d) => segments.last_mut().unwrap().push(d.name),
            Message::Occurrence(o) if o.kind == OccurrenceKind::Heartbeat => {
                segments.push(Vec::new())
            }
            _ => {}
        }
    }
    segments.pop();
    assert_eq!(segments.len(), 4);
    for (i, names) in segments.iter().enumerate() {
        let (current, stale) = if i < 2 {
            ("laser_sum", "laser_n")
        } else {
            ("laser_n", "laser_sum")
        };
        assert!(names.iter().any(|n| n == current), "batch {i}: {names:?}");
        assert!(!names.iter().any(|n| n == stale), "batch {i}: {names:?}");
    }
    assert_eq!(report.upstream.get("laser_n").unwrap(), Some(&Value::Int(2)));
    assert_eq!(report.upstream.get("laser_sum").unwrap(), Some(&Value::Float(3.0)));
}

#[test]
fn collector_barrier_over_queue() {
    let upstream = MemorySink::new();
    let mut collector =
        Collector::new(3, ResultStore::new(Box::new(upstream.clone()))).unwrap();
    let enable = Message::from(smdflow_protocol::Transition::new(TransitionKind::Enable));

    for i in 1..=4 {
        collector.handle(enable.clone()).unwrap();
        let forwarded = upstream.len();
        match i {
            1 | 2 => assert_eq!(forwarded, 0),
            _ => assert_eq!(forwarded, 1),
        }
    }
    assert_eq!(collector.pending(TransitionKind::Enable), 1);
}

fn smd_channels() -> Vec<ChannelBuilder> {
    vec![
        ChannelBuilder::new().configure().events(&[1, 2, 4]),
        ChannelBuilder::new().configure().events(&[1, 3, 4]),
    ]
}

#[test]
fn smd_source_items() {
    let manager = SmdReaderManager::new(sources(smd_channels()), PipelineConfig::new()).unwrap();
    let mut source = SmdSource::new(manager, vec!["a".into(), "b".into()]).unwrap();

    let partition = source.partition();
    assert_eq!(partition.dtype("a"), Some(DataType::Bytes));

    let mut items = Vec::new();
    while let Some(item) = source.next_item().unwrap() {
        items.push(item);
    }
    assert_eq!(items.len(), 4);
    assert!(matches!(
        &items[0],
        SourceItem::Forward(Message::Transition(t)) if t.kind == TransitionKind::Configure
    ));
    let SourceItem::Batch(batch) = &items[1] else {
        panic!("expected batch, got {:?}", items[1]);
    };
    let shape: Vec<(u64, usize)> = batch
        .events
        .iter()
        .map(|e| (e.timestamp, e.datagrams.len()))
        .collect();
    assert_eq!(shape, vec![(1, 2), (2, 1), (3, 1), (4, 2)]);
    assert_eq!(batch.events[2].datagrams[0].name, "b");
    assert_eq!(
        batch.events[2].datagrams[0].value,
        Some(Value::Bytes(3u64.to_le_bytes().to_vec()))
    );
    assert!(matches!(
        &items[2],
        SourceItem::Forward(Message::Occurrence(o)) if o.kind == OccurrenceKind::Heartbeat
    ));
    assert!(matches!(
        &items[3],
        SourceItem::Forward(Message::Occurrence(o)) if o.kind == OccurrenceKind::SourceEnded
    ));
}

#[test]
fn smd_worker_from_files() {
    let files = TestFiles::write(&smd_channels());
    let manager = SmdReaderManager::new(files.sources(), PipelineConfig::new()).unwrap();
    let source = SmdSource::with_default_names(manager);
    let sink = MemorySink::new();
    let mut worker = Worker::new(0, Box::new(source), shared(AccumulateGraph::default()), Box::new(sink.clone()));

    let stats = worker.run().unwrap();
    assert_eq!(stats.events, 4);
    assert_eq!(
        kinds(&sink.take()),
        vec![
            "Allocate",
            "Configure",
            "dgram:chan00",
            "dgram:chan01",
            "Heartbeat",
            "SourceEnded"
        ]
    );
    assert_eq!(
        worker.store().get("chan00").unwrap(),
        Some(&Value::Bytes(4u64.to_le_bytes().to_vec()))
    );
}

#[test]
fn harness_join_with_small_windows() {
    JoinHarness::new(vec![vec![1, 2, 4, 7, 9], vec![1, 3, 4, 8], vec![2, 9]])
        .with_config(PipelineConfig::new().smd_n_events(2).batch_size(2))
        .verify();
}

mod properties {
    use super::*;
    use proptest::prelude::*;
    use smdflow_testkit::channels_strategy;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn join_matches_union(
            channels in channels_strategy(3, 12, 30),
            n_events in 1usize..6,
            batch_size in 1usize..4,
        ) {
            let outcome = JoinHarness::new(channels)
                .with_config(
                    PipelineConfig::new()
                        .chunk_size(4096)
                        .smd_n_events(n_events)
                        .batch_size(batch_size),
                )
                .verify();
            prop_assert!(outcome.batch_sizes.iter().all(|s| *s <= batch_size));
        }

        #[test]
        fn max_events_is_respected(
            channels in channels_strategy(2, 16, 40),
            max_events in 1u64..10,
        ) {
            let outcome = JoinHarness::new(channels)
                .with_config(PipelineConfig::new().smd_n_events(3).max_events(max_events))
                .verify();
            prop_assert!(outcome.processed <= max_events);
        }
    }
}
