//! Benchmarks for permission evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowguard_core::authz::filter_authorized;
use flowguard_core::prelude::*;

/// An engine whose store holds `n` task grants for `demo` plus a few
/// wildcard and group entries.
fn seeded_engine(n: usize) -> AuthorizationEngine {
    let engine = EngineBuilder::new(EngineConfig {
        authorization_enabled: true,
        ..EngineConfig::default()
    })
    .build()
    .unwrap();

    let mut entries: Vec<AuthorizationEntry> = (0..n)
        .map(|i| {
            AuthorizationEntry::grant(
                Principal::user("demo"),
                Resources::TASK,
                ResourceScope::instance(format!("task-{i}")),
            )
            .with_permission(Permissions::READ)
        })
        .collect();
    entries.push(
        AuthorizationEntry::grant(Principal::group("sales"), Resources::PROCESS_INSTANCE, ResourceScope::Any)
            .with_permission(Permissions::READ),
    );
    entries.push(
        AuthorizationEntry::revoke(
            Principal::user("demo"),
            Resources::PROCESS_INSTANCE,
            ResourceScope::instance("pi-0"),
        )
        .with_permission(Permissions::READ),
    );
    engine.service().bootstrap(entries).unwrap();
    engine
}

fn bench_point_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_check");
    for size in [10, 1_000, 10_000] {
        let engine = seeded_engine(size);
        let ctx = engine.identity("demo", Some(vec!["sales".to_string()]));
        let req = CompositeRequirement::leaf(Permissions::READ, Resources::TASK, "task-5");
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(engine.is_authorized(&ctx, &req).unwrap()));
        });
    }
    group.finish();
}

fn bench_composite_check(c: &mut Criterion) {
    let engine = seeded_engine(1_000);
    let ctx = engine.identity("demo", Some(vec!["sales".to_string()]));
    let ops = *engine.operations();
    c.bench_function("composite_or", |b| {
        b.iter(|| {
            let req = ops.read_process_instance(black_box("pi-1"), "invoice");
            black_box(engine.is_authorized(&ctx, &req).unwrap())
        });
    });
    c.bench_function("composite_and", |b| {
        b.iter(|| {
            let req = ops.update_definition_and_instances("invoice", &["pi-1", "pi-2", "pi-3"]);
            black_box(engine.is_authorized(&ctx, &req).unwrap())
        });
    });
}

fn bench_list_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_authorized");
    let engine = seeded_engine(1_000);
    let ctx = engine.identity("demo", None);
    for rows in [10usize, 100, 1_000] {
        let ids: Vec<String> = (0..rows).map(|i| format!("task-{}", i * 2)).collect();
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &ids, |b, ids| {
            b.iter(|| {
                let visible = filter_authorized(engine.evaluator(), &ctx, ids.clone(), |id| {
                    CompositeRequirement::leaf(Permissions::READ, Resources::TASK, id.as_str())
                })
                .unwrap();
                black_box(visible)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_point_check, bench_composite_check, bench_list_filtering);
criterion_main!(benches);
