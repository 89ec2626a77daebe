//! Frame encode/decode throughput.
//!
//! Measures the serde_json envelope codec in isolation (no sockets), for a
//! small calculator-sized payload and a few larger bodies.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use netbridge_core::correlation::CorrelationId;
use netbridge_wire::{codec, FrameDecoder, TaskEnvelope};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct Payload {
    op: String,
    operands: Vec<i64>,
    note: String,
}

fn payload(size: usize) -> TaskEnvelope<Payload> {
    TaskEnvelope::new(
        CorrelationId::next(),
        Payload {
            op: "add".into(),
            operands: vec![3, 4],
            note: "x".repeat(size),
        },
    )
}

const BODY_SIZES: &[usize] = &[0, 256, 4096, 65536];

fn encode_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");
    for &size in BODY_SIZES {
        let envelope = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &envelope, |b, env| {
            b.iter(|| codec::encode(black_box(env)).unwrap());
        });
    }
    group.finish();
}

fn decode_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode_stream");
    for &size in BODY_SIZES {
        let frames: Vec<u8> = (0..32)
            .flat_map(|_| codec::encode(&payload(size)).unwrap().to_vec())
            .collect();
        group.throughput(Throughput::Bytes(frames.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frames, |b, wire| {
            b.iter(|| {
                let mut decoder = FrameDecoder::default();
                let mut buf = BytesMut::from(&wire[..]);
                let mut count = 0;
                while let Some(body) = decoder.decode(&mut buf).unwrap() {
                    let env: TaskEnvelope<Payload> = codec::decode_payload(&body).unwrap();
                    black_box(env);
                    count += 1;
                }
                assert_eq!(count, 32);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, encode_envelope, decode_stream);
criterion_main!(benches);
