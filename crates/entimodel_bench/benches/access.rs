//! Access constraint benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use entimodel_bench::user_with_policies;
use entimodel_core::access::{AccessManager, CrudEntityContext, ReadEntityQueryContext};
use entimodel_core::ConstraintRegistry;
use entimodel_storage::LoadQuery;
use std::sync::Arc;

/// Benchmark CRUD checks against the standard registry.
fn bench_crud(c: &mut Criterion) {
    let access = AccessManager::new(Arc::new(ConstraintRegistry::standard()));
    let auth = user_with_policies(0);

    c.bench_function("crud_context", |b| {
        b.iter(|| {
            let mut ctx = CrudEntityContext::new("Pet");
            access
                .apply_registered_constraints(black_box(&mut ctx), &auth)
                .unwrap();
            black_box(ctx.is_read_permitted());
        });
    });
}

/// Benchmark query rewriting with a growing number of row-level roles.
fn bench_query_rewrite(c: &mut Criterion) {
    let access = AccessManager::new(Arc::new(ConstraintRegistry::standard()));
    let mut group = c.benchmark_group("query_rewrite");

    for roles in [1usize, 4, 16] {
        let auth = user_with_policies(roles);
        group.bench_with_input(BenchmarkId::from_parameter(roles), &roles, |b, _| {
            b.iter(|| {
                let mut ctx = ReadEntityQueryContext::new(LoadQuery::new("Pet"));
                access.apply_registered_constraints(&mut ctx, &auth).unwrap();
                black_box(ctx.into_query());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_crud, bench_query_rewrite);
criterion_main!(benches);
