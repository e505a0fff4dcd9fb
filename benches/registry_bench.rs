use criterion::{black_box, criterion_group, criterion_main, Criterion};
use simhttp_core::{GenericHttpHandler, HandlerKind, HandlerRegistry, ResponseDescriptor};

fn populated_registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    for i in 0..256 {
        let path = format!("/CAPS/{i:08x}");
        registry.add_http_handler(
            path,
            GenericHttpHandler::from_descriptor(|_| Ok(ResponseDescriptor::new(200, ""))),
        );
    }
    registry
}

fn prefix_resolution(c: &mut Criterion) {
    let registry = populated_registry();

    c.bench_function("registry_resolve_exact", |b| {
        b.iter(|| registry.resolve_exact(HandlerKind::GenericHttp, black_box("/CAPS/00000080")).is_some())
    });

    c.bench_function("registry_resolve_prefix", |b| {
        b.iter(|| {
            registry
                .resolve_prefix(HandlerKind::GenericHttp, black_box("/CAPS/00000080/seed/extra"))
                .is_some()
        })
    });

    c.bench_function("registry_resolve_miss", |b| {
        b.iter(|| registry.resolve_prefix(HandlerKind::GenericHttp, black_box("/unknown/path")).is_none())
    });
}

criterion_group!(benches, prefix_resolution);
criterion_main!(benches);
