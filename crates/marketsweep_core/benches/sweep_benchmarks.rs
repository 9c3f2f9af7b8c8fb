//! Criterion benchmarks for marketsweep_core
//!
//! Run with: cargo bench -p marketsweep_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use marketsweep_core::builder::{SpecBuilder, build_specs};
use marketsweep_core::controller::{
    PopulationRunController, PopulationSettings, SeedPolicy, StepRunController, SteppedSettings,
    TimingPolicy, execute_run,
};
use marketsweep_core::engine::EngineSelector;
use marketsweep_core::model::{ParameterAxis, SweepSpace};

fn large_space() -> SweepSpace {
    SweepSpace {
        axes: vec![
            ParameterAxis::new("#_LiqSup", (1..=20).map(|n| n * 5)),
            ParameterAxis::new("#_LiqDem", (1..=20).map(|n| n * 2)),
            ParameterAxis::new("BkrBuy_Limit", (0..10).map(|n| n * 100)),
        ],
        replicates: 5,
        ..SweepSpace::default()
    }
}

fn bench_builder(c: &mut Criterion) {
    let space = large_space();
    c.bench_function("build_20k_specs", |b| b.iter(|| build_specs(black_box(&space))));

    let builder = SpecBuilder::new(&space);
    c.bench_function("random_access_spec", |b| {
        b.iter(|| builder.get(black_box(12_345)))
    });
}

fn bench_stepped_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("stepped_mock_run");
    group.sample_size(20);
    let dir = std::env::temp_dir().join("marketsweep-bench");
    let spec = build_specs(&SweepSpace::default()).remove(0);

    for measure_ticks in [100, 500] {
        let settings = SteppedSettings {
            timing: TimingPolicy {
                warmup_ticks: 100,
                measure_ticks,
                ..TimingPolicy::default()
            },
            log_dir: dir.clone(),
            ..SteppedSettings::default()
        };
        let controller = StepRunController::new(EngineSelector::default(), settings);
        group.bench_with_input(
            BenchmarkId::new("measure_ticks", measure_ticks),
            &measure_ticks,
            |b, _| b.iter(|| execute_run(&controller, black_box(&spec), SeedPolicy::Pinned(7))),
        );
    }
    group.finish();
}

fn bench_population_run(c: &mut Criterion) {
    let controller =
        PopulationRunController::new(EngineSelector::default(), PopulationSettings::default());
    let spec = build_specs(&SweepSpace::default()).remove(0);
    c.bench_function("population_default_run", |b| {
        b.iter(|| execute_run(&controller, black_box(&spec), SeedPolicy::Pinned(7)))
    });
}

criterion_group!(benches, bench_builder, bench_stepped_run, bench_population_run);
criterion_main!(benches);
