use std::io::{BufWriter, Write};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;

use bgzf_codec::{CompressionLevel, Writer, BGZF_SAFE_BLOCK_SIZE};

fn bench_writer_levels(c: &mut Criterion) {
    let input = vec![b'A'; BGZF_SAFE_BLOCK_SIZE];

    let mut group = c.benchmark_group("writer_levels");
    group.throughput(Throughput::Bytes(input.len() as u64));

    for level in [1, 6, 9, 12] {
        group.bench_function(format!("level_{level}"), |b| {
            b.iter(|| {
                let mut output = Vec::with_capacity(input.len());
                let mut writer = Writer::new(&mut output, CompressionLevel::new(level).unwrap());
                writer.write_all(black_box(&input)).unwrap();
                writer.close().unwrap();
                black_box(output);
            })
        });
    }

    group.finish();
}

fn bench_writer_throughput(c: &mut Criterion) {
    let input: Vec<u8> = (0..BGZF_SAFE_BLOCK_SIZE * 10).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("writer");
    group.throughput(Throughput::Bytes(input.len() as u64));

    group.bench_function("write_650kb", |b| {
        b.iter(|| {
            let mut output = Vec::with_capacity(input.len());
            let mut writer = Writer::new(&mut output, CompressionLevel::new(6).unwrap());
            writer.write_all(black_box(&input)).unwrap();
            writer.close().unwrap();
            black_box(output);
        })
    });

    group.finish();
}

fn bench_writer_file_io(c: &mut Criterion) {
    let input: Vec<u8> = (0..BGZF_SAFE_BLOCK_SIZE * 100).map(|i| (i % 256) as u8).collect();
    let dir = tempdir().unwrap();

    let mut group = c.benchmark_group("writer_file_io");
    group.throughput(Throughput::Bytes(input.len() as u64));

    group.bench_function("unbuffered", |b| {
        let path = dir.path().join("unbuffered.bgz");
        b.iter(|| {
            let file = std::fs::File::create(&path).unwrap();
            let mut writer = Writer::new(file, CompressionLevel::new(6).unwrap());
            writer.write_all(black_box(&input)).unwrap();
            writer.close().unwrap();
        })
    });

    group.bench_function("bufwriter_256k", |b| {
        let path = dir.path().join("buffered.bgz");
        b.iter(|| {
            let file = std::fs::File::create(&path).unwrap();
            let file = BufWriter::with_capacity(256 * 1024, file);
            let mut writer = Writer::new(file, CompressionLevel::new(6).unwrap());
            writer.write_all(black_box(&input)).unwrap();
            writer.close().unwrap();
        })
    });

    group.finish();
}

fn bench_reader_throughput(c: &mut Criterion) {
    let input: Vec<u8> = (0..BGZF_SAFE_BLOCK_SIZE * 10).map(|i| (i % 256) as u8).collect();
    let mut compressed = Vec::new();
    let mut writer = Writer::new(&mut compressed, CompressionLevel::new(6).unwrap());
    writer.write_all(&input).unwrap();
    writer.close().unwrap();

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Bytes(input.len() as u64));

    for worker_count in [1, 4] {
        group.bench_function(format!("read_650kb_workers_{worker_count}"), |b| {
            b.iter(|| {
                let mut reader = bgzf_codec::Reader::with_worker_count(compressed.as_slice(), worker_count);
                let mut out = Vec::with_capacity(input.len());
                std::io::Read::read_to_end(&mut reader, &mut out).unwrap();
                black_box(out);
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_writer_levels,
    bench_writer_throughput,
    bench_writer_file_io,
    bench_reader_throughput
);
criterion_main!(benches);
