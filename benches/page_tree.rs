//! Benchmarks for page tree writes and reloads
//!
//! Measures the cost of appending pages under one parent and of rebuilding
//! the in-memory tree from the row store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pagetree::{
    DurabilityMode, EnvBuilder, Environment, PageModelRegistry, PageTreeService, PageVersion, ServiceBuilder,
    WidgetInstance, WidgetTypeInfo, WidgetTypeRegistry,
};
use std::sync::Arc;
use tempfile::TempDir;

fn service(env: Environment) -> PageTreeService {
    let models = PageModelRegistry::new().with_model("home", 6);
    let types = WidgetTypeRegistry::new().with_type("content_viewer", WidgetTypeInfo::configurable(None));
    ServiceBuilder::new()
        .action_log_capacity(0)
        .build(env, Arc::new(models), Arc::new(types))
        .unwrap()
}

fn populated(env: Environment, size: usize) -> PageTreeService {
    let service = service(env);
    for i in 0..size {
        let parent = if i < 10 { "homepage".to_string() } else { format!("page_{:05}", i % 10) };
        let draft = PageVersion::new("home", 6)
            .with_title("en", format!("Page {}", i))
            .with_widget(0, WidgetInstance::new("content_viewer"))
            .unwrap();
        service.add_page(&parent, &format!("page_{:05}", i), "free", draft).unwrap();
    }
    service
}

fn bench_add_pages(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_pages");

    for size in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("in_memory", size), &size, |b, &size| {
            b.iter_batched(
                || service(EnvBuilder::new().open_in_memory().unwrap()),
                |service| {
                    for i in 0..size {
                        service
                            .add_page("homepage", &format!("page_{:05}", i), "free", PageVersion::new("home", 6))
                            .unwrap();
                    }
                    black_box(service.pages_status())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.bench_function("file_backed_nosync/100", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let env = EnvBuilder::new().durability(DurabilityMode::NoSync).open(dir.path()).unwrap();
                (service(env), dir)
            },
            |(service, _dir)| {
                for i in 0..100 {
                    service
                        .add_page("homepage", &format!("page_{:05}", i), "free", PageVersion::new("home", 6))
                        .unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh");

    for size in [100, 1000] {
        let service = populated(EnvBuilder::new().open_in_memory().unwrap(), size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                service.refresh().unwrap();
                black_box(service.snapshot().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add_pages, bench_refresh);
criterion_main!(benches);
