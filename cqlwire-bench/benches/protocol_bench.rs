//! Protocol encoding/decoding benchmarks.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cqlwire_protocol::{
    decode_header, encode_header, BodyReader, ConsistencyLevel, Frame, FrameDecoder, Opcode,
    ProtocolVersion, Response,
};

fn query_body(size: usize) -> Bytes {
    let query = format!("INSERT INTO ks.t (k, v) VALUES (1, '{}')", "x".repeat(size));
    let mut builder = Response::new(0, Opcode::Query);
    builder.write_long_string(&query).unwrap();
    builder.write_consistency(ConsistencyLevel::LocalQuorum);
    builder.write_byte(0);
    Bytes::copy_from_slice(builder.body())
}

fn bench_header_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_encode");

    for version in ProtocolVersion::ALL {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(version),
            &version,
            |b, &version| {
                b.iter(|| black_box(encode_header(version, 42, Opcode::Result, 1024).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_header_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_decode");

    for version in ProtocolVersion::ALL {
        let encoded = encode_header(version, 42, Opcode::Result, 1024).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(version),
            &encoded,
            |b, encoded| {
                b.iter(|| black_box(decode_header(Some(version), encoded).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_frame_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoder");

    for size in [100, 1000, 10000] {
        let frame = Frame::request(ProtocolVersion::V4, 1, Opcode::Query, query_body(size)).unwrap();
        let encoded = frame.encode().unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                decoder.extend(encoded);
                black_box(decoder.decode_frame().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_query_body_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_body_decode");

    for size in [100, 1000, 10000] {
        let body = query_body(size);

        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| {
                let mut reader = BodyReader::new(body.clone());
                let query = reader.long_string().unwrap();
                let consistency = reader.consistency_level().unwrap();
                black_box((query, consistency, reader.byte().unwrap()))
            });
        });
    }

    group.finish();
}

fn bench_supported_response(c: &mut Criterion) {
    let options = [
        ("CQL_VERSION", "3.0.0"),
        ("CQL_VERSION", "3.2.0"),
        ("COMPRESSION", "snappy"),
    ];

    c.bench_function("supported_finalize", |b| {
        b.iter(|| {
            let response = Response::supported(0, options).unwrap();
            black_box(response.finalize(ProtocolVersion::V3).unwrap())
        });
    });
}

fn bench_result_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_finalize");

    for size in [100, 1000, 10000, 100000] {
        let payload = vec![0x42u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(Response::result(7, payload).finalize(ProtocolVersion::V4).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_header_encode,
    bench_header_decode,
    bench_frame_decoder,
    bench_query_body_decode,
    bench_supported_response,
    bench_result_response,
);

criterion_main!(benches);
