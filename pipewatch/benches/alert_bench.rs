//! Benchmarks for alert rule evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pipewatch::core::RunStatus;
use pipewatch::monitor::{AlertRuleEngine, AlertRuleSet, DataStats, MessageTemplate, PipelineStats};
use pipewatch::testing::finished_run;
use pipewatch::utils::now_utc;

fn sample_stats(runs: usize) -> PipelineStats {
    let sample: Vec<_> = (0..runs)
        .map(|i| {
            let status = if i % 4 == 0 {
                RunStatus::Failed
            } else {
                RunStatus::Succeeded
            };
            finished_run("etl_pipeline", status, 4000)
        })
        .collect();
    PipelineStats::from_runs("etl_pipeline", &sample, now_utc())
}

fn evaluation_benchmark(c: &mut Criterion) {
    let engine = AlertRuleEngine::default();
    let rules = AlertRuleSet::defaults();
    let data = DataStats {
        total_messages: Some(50),
        ..DataStats::default()
    };

    let mut group = c.benchmark_group("evaluate_default_rules");
    for runs in [1_usize, 50, 500] {
        let stats = sample_stats(runs);
        group.bench_with_input(BenchmarkId::from_parameter(runs), &stats, |b, stats| {
            b.iter(|| engine.evaluate(black_box(rules.rules()), black_box(stats), &data));
        });
    }
    group.finish();
}

fn aggregation_benchmark(c: &mut Criterion) {
    let sample: Vec<_> = (0..50)
        .map(|_| finished_run("etl_pipeline", RunStatus::Succeeded, 120))
        .collect();
    c.bench_function("pipeline_stats_from_50_runs", |b| {
        b.iter(|| PipelineStats::from_runs("etl_pipeline", black_box(&sample), now_utc()));
    });
}

fn template_benchmark(c: &mut Criterion) {
    c.bench_function("parse_failure_rate_template", |b| {
        b.iter(|| {
            MessageTemplate::parse(black_box(
                "High failure rate: {failure_rate:.1%} (threshold: {threshold:.1%})",
            ))
        });
    });
}

criterion_group!(
    benches,
    evaluation_benchmark,
    aggregation_benchmark,
    template_benchmark
);
criterion_main!(benches);
