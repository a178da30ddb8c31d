//! Criterion benchmark untuk CircularByteBuffer
//!
//! Run dengan: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stagebuf::{Backing, BufferConfig, CircularByteBuffer};

const CAPACITY: usize = 64 * 1024;

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");

    for chunk in [64usize, 1024, 16 * 1024] {
        group.throughput(Throughput::Bytes(chunk as u64));

        // Cursor tidak pernah align dengan chunk, jadi sebagian iterasi wraparound
        group.bench_with_input(BenchmarkId::new("write_read", chunk), &chunk, |b, &chunk| {
            let rb = CircularByteBuffer::with_capacity(CAPACITY + 7).unwrap();
            let input = vec![0xA5u8; chunk];
            let mut output = vec![0u8; chunk];
            b.iter(|| {
                rb.write(black_box(&input)).unwrap();
                rb.read(black_box(&mut output)).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("write_skip", chunk), &chunk, |b, &chunk| {
            let rb = CircularByteBuffer::with_capacity(CAPACITY + 7).unwrap();
            let input = vec![0x5Au8; chunk];
            b.iter(|| {
                rb.write(black_box(&input)).unwrap();
                rb.skip(black_box(chunk as isize)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer");

    for chunk in [1024usize, 16 * 1024] {
        group.throughput(Throughput::Bytes(chunk as u64));
        group.bench_with_input(BenchmarkId::new("append", chunk), &chunk, |b, &chunk| {
            let src = CircularByteBuffer::with_capacity(CAPACITY).unwrap();
            let dst = CircularByteBuffer::with_capacity(CAPACITY + 13).unwrap();
            let input = vec![1u8; chunk];
            b.iter(|| {
                src.write(&input).unwrap();
                black_box(dst.append(&src).unwrap());
                dst.skip(chunk as isize).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_backing(c: &mut Criterion) {
    let mut group = c.benchmark_group("backing");
    let chunk = 4096usize;
    group.throughput(Throughput::Bytes(chunk as u64));

    for backing in [Backing::Heap, Backing::Anonymous] {
        group.bench_function(format!("write_read_{}", backing), |b| {
            let rb = CircularByteBuffer::with_config(BufferConfig::new().with_backing(backing));
            rb.create(CAPACITY).unwrap();
            let input = vec![0u8; chunk];
            let mut output = vec![0u8; chunk];
            b.iter(|| {
                rb.write(black_box(&input)).unwrap();
                rb.read(black_box(&mut output)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_read, bench_transfer, bench_backing);
criterion_main!(benches);
