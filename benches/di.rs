use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_ioc::*;
use std::sync::Arc;

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let container = Container::new();
    container.register_instance(42u64).unwrap();

    // Prime the compiled producer
    let _ = container.get::<u64>().unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = container.get::<u64>().unwrap();
            black_box(v);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    c.bench_function("singleton_cold_expensive", |b| {
        b.iter_batched(
            || {
                let container = Container::new();
                container
                    .register_delegate(Reuse::Singleton, |_| {
                        Ok(ExpensiveToCreate {
                            data: (0..1000).collect(),
                        })
                    })
                    .unwrap();
                container
            },
            |container| {
                let v = container.get::<ExpensiveToCreate>().unwrap();
                black_box(v.data.len());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_scoped_vs_transient(c: &mut Criterion) {
    struct Service {
        data: [u8; 64],
    }

    let mut group = c.benchmark_group("scoped_vs_transient");

    let scoped = Container::new();
    scoped
        .register_delegate(Reuse::Scoped, |_| Ok(Service { data: [0; 64] }))
        .unwrap();
    let scope = scoped.open_scope(None).unwrap();

    group.bench_function("scoped_hit", |b| {
        b.iter(|| {
            let v = scope.get::<Service>().unwrap();
            black_box(&v.data);
        })
    });

    let transient = Container::new();
    transient.register_made(Made::of(|| Service { data: [0; 64] })).unwrap();

    group.bench_function("transient", |b| {
        b.iter(|| {
            let v = transient.get::<Service>().unwrap();
            black_box(&v.data);
        })
    });

    group.bench_function("open_and_dispose_scope", |b| {
        b.iter(|| {
            let scope = scoped.open_scope(None).unwrap();
            black_box(scope.get::<Service>().unwrap());
            scope.dispose().unwrap();
        })
    });

    group.finish();
}

fn bench_constructor_params(c: &mut Criterion) {
    struct Config {
        port: u16,
    }
    struct Server {
        config: Arc<Config>,
    }

    let container = Container::new();
    container.register_instance(Config { port: 8080 }).unwrap();
    container
        .register_made(Made::new(
            Ctor::new(|args| Ok(Server { config: args.get::<Config>(0)? })).param(Param::of::<Config>()),
        ))
        .unwrap();

    c.bench_function("transient_with_param", |b| {
        b.iter(|| {
            let server = container.get::<Server>().unwrap();
            black_box(server.config.port);
        })
    });
}

fn bench_concrete_vs_trait(c: &mut Criterion) {
    trait Greeter: Send + Sync {
        fn greet(&self) -> usize;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> usize {
            5
        }
    }

    let mut group = c.benchmark_group("concrete_vs_trait");

    let container = Container::new();
    container.register_instance(English).unwrap();
    container
        .register_trait::<dyn Greeter>()
        .reuse(Reuse::Singleton)
        .delegate(|_| Ok(Arc::new(English) as Arc<dyn Greeter>))
        .register()
        .unwrap();

    group.bench_function("concrete", |b| {
        b.iter(|| black_box(container.get::<English>().unwrap().greet()))
    });
    group.bench_function("trait", |b| {
        b.iter(|| black_box(container.get_trait::<dyn Greeter>().unwrap().greet()))
    });

    group.finish();
}

fn bench_many_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_scaling");

    for count in [1usize, 8, 64] {
        let container = Container::new();
        for i in 0..count {
            container.register_made(Made::of(move || i)).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), &container, |b, container| {
            b.iter(|| black_box(container.get_all::<usize>().unwrap().len()))
        });
    }

    group.finish();
}

fn bench_decorated(c: &mut Criterion) {
    let container = Container::new();
    container.register_made(Made::of(|| String::from("value"))).unwrap();
    container
        .register_decorator::<String, _>(|inner, _| Ok(Arc::new(format!("[{}]", inner))))
        .unwrap();

    c.bench_function("decorated_transient", |b| {
        b.iter(|| black_box(container.get::<String>().unwrap().len()))
    });
}

// ===== Macro Benchmarks =====

fn bench_large_registry(c: &mut Criterion) {
    macro_rules! services {
        ($($name:ident),*) => {
            $(struct $name;)*
            fn register_all(container: &Container) {
                $(container.register_made(Made::of(|| $name)).unwrap();)*
            }
        };
    }
    services!(S0, S1, S2, S3, S4, S5, S6, S7, S8, S9, S10, S11, S12, S13, S14, S15);

    let container = Container::new();
    register_all(&container);
    for i in 0..256i32 {
        container.register::<i32>().key(i).instance(i).register().unwrap();
    }

    c.bench_function("large_registry_keyed_lookup", |b| {
        b.iter(|| black_box(*container.get_keyed::<i32>(128).unwrap()))
    });
}

fn bench_register_while_resolving(c: &mut Criterion) {
    c.bench_function("register_then_resolve", |b| {
        b.iter_batched(
            Container::new,
            |container| {
                for i in 0..32i32 {
                    container.register::<i32>().key(i).instance(i).register().unwrap();
                    black_box(container.get_keyed::<i32>(i).unwrap());
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    micro_benches,
    bench_singleton_hit,
    bench_singleton_cold,
    bench_scoped_vs_transient,
    bench_constructor_params,
    bench_concrete_vs_trait,
    bench_many_scaling,
    bench_decorated
);

criterion_group!(macro_benches, bench_large_registry, bench_register_while_resolving);

criterion_main!(micro_benches, macro_benches);
