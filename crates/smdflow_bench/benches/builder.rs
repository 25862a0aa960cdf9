//! Event building benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use smdflow_bench::channels;
use smdflow_core::{BuildOptions, EventBuilder, PipelineConfig, SmdReaderManager};
use smdflow_storage::{ChannelSource, InMemorySource};

/// Benchmark joining pre-read channel views.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for n_channels in [2usize, 8, 32] {
        let data = channels(n_channels, 1000, 64);
        let views: Vec<&[u8]> = data.iter().map(Vec::as_slice).collect();
        let options = BuildOptions::new(100);
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(n_channels), &views, |b, views| {
            b.iter(|| {
                let mut builder = EventBuilder::new(black_box(views)).unwrap();
                let batches = builder.build_all(&options);
                black_box(batches.len());
            });
        });
    }

    group.finish();
}

/// Benchmark the full read, window and build loop.
fn bench_manager(c: &mut Criterion) {
    let mut group = c.benchmark_group("manager");

    for chunk_size in [4096usize, 64 * 1024, 1024 * 1024] {
        let data = channels(4, 5000, 128);
        let bytes: usize = data.iter().map(Vec::len).sum();
        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &data, |b, data| {
            b.iter(|| {
                let sources: Vec<Box<dyn ChannelSource>> = data
                    .iter()
                    .map(|d| Box::new(InMemorySource::with_data(d.clone())) as Box<dyn ChannelSource>)
                    .collect();
                let config = PipelineConfig::new().chunk_size(chunk_size);
                let mut manager = SmdReaderManager::new(sources, config).unwrap();
                manager.get_next_dgrams().unwrap();
                let mut events = 0;
                while let Some(batches) = manager.next_batch_iter().unwrap() {
                    for batch in batches {
                        events += batch.nevents();
                    }
                }
                black_box(events);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_manager);
criterion_main!(benches);
