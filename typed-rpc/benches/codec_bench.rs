//! Benchmarks for the structured codec and request dispatch
//!
//! Run with: cargo bench --package typed-rpc --bench codec_bench

use axum::body::Body;
use axum::http::Request;
use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use typed_rpc::{HandlerArgs, Procedure, RichValue, Router, RpcConfig, decode, encode};

fn usage() -> RichValue {
    RichValue::object([
        ("categoriesUsed", RichValue::from(2)),
        ("categoriesLimit", RichValue::from(3)),
        ("eventsUsed", RichValue::from(41)),
        ("eventsLimit", RichValue::from(100)),
        (
            "resetDate",
            RichValue::from(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()),
        ),
    ])
}

fn categories(count: usize) -> RichValue {
    RichValue::Array(
        (0..count)
            .map(|i| {
                RichValue::object([
                    ("id", RichValue::from(format!("cat_{}", i))),
                    ("name", RichValue::from(format!("category {}", i))),
                    ("color", RichValue::from("#ff6b6b")),
                    ("emoji", RichValue::Undefined),
                    (
                        "createdAt",
                        RichValue::from(Utc.timestamp_millis_opt(1_700_000_000_000 + i as i64).unwrap()),
                    ),
                ])
            })
            .collect(),
    )
}

// =============================================================================
// Codec Benchmarks
// =============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let plain = RichValue::from(json!({ "status": "ok", "uptime": 1234 }));
    group.bench_function("encode_plain", |b| b.iter(|| encode(black_box(&plain))));

    let rich = usage();
    group.bench_function("encode_usage", |b| b.iter(|| encode(black_box(&rich))));

    let envelope = encode(&rich);
    group.bench_function("decode_usage", |b| b.iter(|| decode(black_box(&envelope))));

    for count in [10, 100, 1000] {
        let value = categories(count);
        let envelope = encode(&value);
        group.bench_with_input(BenchmarkId::new("encode_categories", count), &value, |b, v| {
            b.iter(|| encode(black_box(v)))
        });
        group.bench_with_input(
            BenchmarkId::new("decode_categories", count),
            &envelope,
            |b, e| b.iter(|| decode(black_box(e))),
        );
    }

    group.finish();
}

// =============================================================================
// Dispatch Benchmarks
// =============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut router = Router::new().operation(
        "getUsage",
        Procedure::<()>::new().query(|args: HandlerArgs<(), ()>| async move { args.structured(usage()) }),
    );
    for i in 0..50 {
        router = router.operation(
            format!("filler{}", i),
            Procedure::<()>::new().query(|args: HandlerArgs<(), ()>| async move { args.json(&()) }),
        );
    }
    let compiled = router.compile((), RpcConfig::default()).unwrap();

    group.bench_function("structured_query", |b| {
        b.iter(|| {
            let request = Request::get("/api/getUsage").body(Body::empty()).unwrap();
            rt.block_on(compiled.handle(black_box(request)))
        })
    });

    group.bench_function("not_found", |b| {
        b.iter(|| {
            let request = Request::get("/api/missing").body(Body::empty()).unwrap();
            rt.block_on(compiled.handle(black_box(request)))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_dispatch);
criterion_main!(benches);
