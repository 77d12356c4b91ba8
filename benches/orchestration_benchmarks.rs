use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use tasker_concurrency::{AdmissionController, ConcurrencyConfig, ConcurrencyService, Operation};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("build benchmark runtime")
}

fn benchmark_admission_round_trip(c: &mut Criterion) {
    let admission = AdmissionController::new(16).expect("valid limit");
    c.bench_function("admission_try_acquire_release", |b| {
        b.iter(|| {
            let ticket = admission.try_acquire();
            black_box(ticket)
        })
    });
}

fn benchmark_run_concurrently(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("run_concurrently");

    for count in [10usize, 100, 1_000] {
        for sequential in [false, true] {
            let service = ConcurrencyService::new(ConcurrencyConfig {
                disable_concurrency_in_testing: sequential,
                ..ConcurrencyConfig::default()
            })
            .expect("valid config");
            let mode = if sequential { "sequential" } else { "concurrent" };

            group.bench_with_input(BenchmarkId::new(mode, count), &count, |b, &count| {
                b.iter(|| {
                    let operations: HashMap<String, Operation<usize>> = (0..count)
                        .map(|i| (format!("op{i}"), Operation::new(move || async move { Ok(i) })))
                        .collect();
                    rt.block_on(service.run_concurrently(operations))
                })
            });
        }
    }

    group.finish();
}

fn benchmark_run_batch(c: &mut Criterion) {
    let rt = runtime();
    let service = ConcurrencyService::new(ConcurrencyConfig::default()).expect("valid config");
    let mut group = c.benchmark_group("run_batch");

    for batch_size in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let items: Vec<u64> = (0..500).collect();
                    rt.block_on(service.run_batch(items, |x| async move { Ok(x + 1) }, batch_size))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_admission_round_trip,
    benchmark_run_concurrently,
    benchmark_run_batch
);
criterion_main!(benches);
