//! Benchmarks for the record cache.
//!
//! Run with: cargo bench --bench cache_bench

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::thread;

use dnscache::dns::Query;
use dnscache::{CacheKey, RecordCache};

fn create_dns_query(query_id: u16, domain: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(512);

    // Header (12 bytes)
    packet.extend_from_slice(&query_id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]); // Flags: standard query
    packet.extend_from_slice(&[0x00, 0x01]); // Questions: 1
    packet.extend_from_slice(&[0x00, 0x00]); // Answer RRs: 0
    packet.extend_from_slice(&[0x00, 0x00]); // Authority RRs: 0
    packet.extend_from_slice(&[0x00, 0x00]); // Additional RRs: 0

    // Question section
    for label in domain.split('.') {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0x00); // Root label

    packet.extend_from_slice(&[0x00, 0x01]); // Type: A
    packet.extend_from_slice(&[0x00, 0x01]); // Class: IN

    packet
}

fn create_dns_response(query: &[u8]) -> Vec<u8> {
    let mut response = query.to_vec();
    response[2] = 0x81;
    response[3] = 0x80;
    response[7] = 0x01; // Answer count: 1
    response.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01]);
    response.extend_from_slice(&3600u32.to_be_bytes());
    response.extend_from_slice(&[0x00, 0x04, 93, 184, 216, 34]);
    response
}

fn bench_key_derivation(c: &mut Criterion) {
    let short = create_dns_query(0x1234, "example.com");
    let long = create_dns_query(0x1234, "subdomain.example.domain.com");

    c.bench_function("parse_and_derive_key_short", |b| {
        b.iter(|| CacheKey::from_query(&Query::parse(black_box(&short)).unwrap()))
    });

    c.bench_function("parse_and_derive_key_long", |b| {
        b.iter(|| CacheKey::from_query(&Query::parse(black_box(&long)).unwrap()))
    });
}

fn bench_find(c: &mut Criterion) {
    let cache = RecordCache::new();
    for i in 0..1000 {
        let raw = create_dns_query(0, &format!("host{i}.example.com"));
        cache.store(&Query::parse(&raw).unwrap(), &create_dns_response(&raw));
    }

    let hit = Query::parse(&create_dns_query(1, "host500.example.com")).unwrap();
    let miss = Query::parse(&create_dns_query(1, "absent.example.com")).unwrap();

    let mut group = c.benchmark_group("find");
    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("find", "hit"), |b| {
        b.iter(|| cache.find(black_box(&hit)))
    });
    group.bench_function(BenchmarkId::new("find", "miss"), |b| {
        b.iter(|| cache.find(black_box(&miss)))
    });
    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let cache = RecordCache::new();
    let raw = create_dns_query(0, "example.com");
    let query = Query::parse(&raw).unwrap();
    let response = create_dns_response(&raw);

    c.bench_function("store_replace", |b| {
        b.iter(|| cache.store(black_box(&query), black_box(&response)))
    });
}

fn bench_contended_find(c: &mut Criterion) {
    let raw = create_dns_query(0, "example.com");
    let query = Query::parse(&raw).unwrap();
    let cache = Arc::new(RecordCache::new());
    cache.store(&query, &create_dns_response(&raw));

    let mut group = c.benchmark_group("contended");
    group.throughput(Throughput::Elements(4 * 1000));
    group.bench_function("find_4_threads_x1000", |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for _ in 0..4 {
                    let cache = &cache;
                    let query = &query;
                    scope.spawn(move || {
                        for _ in 0..1000 {
                            black_box(cache.find(query));
                        }
                    });
                }
            });
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_find,
    bench_store,
    bench_contended_find,
);

criterion_main!(benches);
