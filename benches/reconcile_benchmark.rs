//! Reconciliation throughput over dense, sparse and truncated windows

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use vn_catalog_sync::sync_engine::Reconciler;
use vn_catalog_sync::test_utils::FakeCatalogSource;
use vn_catalog_sync::Window;

fn reconcile_windows(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let reconciler = Reconciler::default();
    let window = Window::new(1001, 10);

    let sources = [
        ("dense", FakeCatalogSource::with_codes(1..=2000)),
        ("every_third", FakeCatalogSource::with_codes((1..=2000).filter(|code| code % 3 == 0))),
        ("empty", FakeCatalogSource::with_codes(std::iter::empty())),
        ("truncated_to_2", FakeCatalogSource::with_codes(1..=2000).truncate_responses(2)),
    ];

    let mut group = c.benchmark_group("reconcile_window");
    for (name, source) in &sources {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.to_async(&rt).iter(|| async {
                source.clear_fetch_calls();
                black_box(reconciler.reconcile(source, &window).await.unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, reconcile_windows);
criterion_main!(benches);
