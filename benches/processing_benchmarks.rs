//! Benchmarks for the transaction processors
//!
//! These benchmarks measure:
//! - Address derivation and classification
//! - Direct matching through the handler registry
//! - State root computation for growing stores
//! - Replay of mixed logs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use dxtp::codec;
use dxtp::{
    AddressScheme, Dimension, Exchange, ExchangeOp, ExchangePayload, HandlerRegistry,
    IdentGenerator, MemoryContext, ProcessorConfig, Quantity, Ratio, ReciprocateRequest,
    ReplayEngine, StaticVerifier, TransactionEnvelope, Utxq, Version,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn registry() -> HandlerRegistry {
    let verifier = Arc::new(StaticVerifier::accepting());
    HandlerRegistry::with_defaults(&ProcessorConfig::default(), verifier)
        .expect("default families register")
}

/// Initiate and reciprocate envelopes for `count` independent matches
fn match_log(count: usize) -> Vec<TransactionEnvelope> {
    let scheme = AddressScheme::default();
    let mut idents = IdentGenerator::new(count as u64);
    let version = Version::new(0, 1, 0);
    let utxq = Utxq::new(Exchange::new("church", "turing", Quantity::new(5, 2, 3)));
    let request = ReciprocateRequest {
        exchange: Exchange::new("turing", "church", Quantity::new(10, 5, 7)),
        ratio: Ratio::new(Quantity::new(2, 5, 7), Quantity::new(1, 2, 3)),
    };
    let utxq_bytes = codec::encode(&utxq).expect("encode utxq");
    let request_bytes = codec::encode(&request).expect("encode request");

    let mut log = Vec::with_capacity(count * 2);
    for _ in 0..count {
        let ukey = scheme.exchange(ExchangeOp::Ask, &idents.next_ident()).to_string();
        let mkey = scheme.exchange(ExchangeOp::Tell, &idents.next_ident()).to_string();
        let initiate = ExchangePayload::initiate(ukey.clone(), utxq_bytes.clone());
        let reciprocate = ExchangePayload::reciprocate(ukey, mkey, request_bytes.clone());
        log.push(
            TransactionEnvelope::encode("church", "hashblock_match", &version, &initiate)
                .expect("envelope"),
        );
        log.push(
            TransactionEnvelope::encode("turing", "hashblock_match", &version, &reciprocate)
                .expect("envelope"),
        );
    }
    log
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_address_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_derivation");
    let scheme = AddressScheme::default();

    group.bench_function("settings", |b| {
        b.iter(|| black_box(scheme.settings(black_box(Dimension::Unit))));
    });

    group.bench_function("asset", |b| {
        b.iter(|| {
            black_box(scheme.asset(Dimension::Resource, black_box("metric"), black_box("kilogram")))
        });
    });

    let address = scheme.exchange(ExchangeOp::Offer, "0123456789abcdef0123456789abcdef");
    group.bench_function("classify_exchange", |b| {
        b.iter(|| black_box(scheme.classify(black_box(address.as_str()))));
    });

    group.finish();
}

fn bench_direct_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_match");
    let registry = registry();

    for count in [1, 10, 100].iter() {
        let log = match_log(*count);
        group.throughput(Throughput::Elements(log.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &log, |b, log| {
            b.iter(|| {
                let mut context = MemoryContext::new();
                for envelope in log {
                    registry.apply(envelope, &mut context).expect("match applies");
                }
                black_box(context.state_root())
            });
        });
    }

    group.finish();
}

fn bench_state_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_root");
    let registry = registry();

    for count in [10, 100, 1000].iter() {
        let mut context = MemoryContext::new();
        for envelope in match_log(*count) {
            registry.apply(&envelope, &mut context).expect("match applies");
        }
        group.throughput(Throughput::Elements(context.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &context, |b, context| {
            b.iter(|| black_box(context.state_root()));
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    group.sample_size(20);
    let engine = ReplayEngine::builder()
        .with_registry(registry())
        .build()
        .expect("engine builds");

    for count in [10, 100].iter() {
        let log = match_log(*count);
        group.bench_with_input(BenchmarkId::new("sequential", count), &log, |b, log| {
            b.iter(|| black_box(engine.replay(log).final_root));
        });
        group.bench_with_input(BenchmarkId::new("four_replicas", count), &log, |b, log| {
            b.iter(|| black_box(engine.verify_determinism(log, 4).are_identical()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_address_derivation,
    bench_direct_match,
    bench_state_root,
    bench_replay
);
criterion_main!(benches);
