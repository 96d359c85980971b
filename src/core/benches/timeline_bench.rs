//! Benchmarks for timeline aggregation: mapping, sorting, grouping, filtering.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sporelog_core::model::{
    Observation, ObservationKind, Record, RecordKind, TransferDirection, TransferEvent,
};
use sporelog_core::timeline::{TimelineAggregator, TimelineEventType};

/// A record carrying `n` observations and `n / 4` transfers spread over
/// `n / 3` distinct days, oldest first.
fn build_record(n: usize) -> Record {
    let mut record = Record::new(RecordKind::Grow, "bench grow");
    let start = Utc::now() - Duration::days((n / 3) as i64);
    for i in 0..n {
        let ts = start + Duration::hours(i as i64 * 8);
        let kind = match i % 5 {
            0 => ObservationKind::StageChange,
            1 => ObservationKind::Contamination,
            _ => ObservationKind::Growth,
        };
        let mut obs = Observation::new(kind, ts).with_note(format!("entry {i}"));
        if kind == ObservationKind::StageChange {
            obs = obs.with_stage("colonization");
        }
        record.observations.push(obs);
        if i % 4 == 0 {
            record
                .transfers
                .push(TransferEvent::new(TransferDirection::Out, ts));
        }
    }
    record
}

fn bench_aggregate(c: &mut Criterion) {
    let aggregator = TimelineAggregator::new();
    let empty_filter = HashSet::new();
    let mut group = c.benchmark_group("timeline_aggregate");
    for size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        let record = build_record(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| black_box(aggregator.aggregate(record, None, &empty_filter)));
        });
    }
    group.finish();
}

fn bench_aggregate_filtered(c: &mut Criterion) {
    let aggregator = TimelineAggregator::new();
    let filter: HashSet<_> = [
        TimelineEventType::Contamination,
        TimelineEventType::StageChange,
    ]
    .into_iter()
    .collect();
    let mut group = c.benchmark_group("timeline_aggregate_filtered");
    for size in [100, 1_000] {
        let record = build_record(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| black_box(aggregator.aggregate(record, None, &filter)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_aggregate_filtered);
criterion_main!(benches);
