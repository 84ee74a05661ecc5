//! Record table benchmarks.
//!
//! Field reads measure the page lookup plus block cache path; insert/delete
//! pairs measure page splits and directory shifts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nodestore::{DiskTable, MemTable, RecordTable, TableConfig, NODE_SIZE};
use tempfile::tempdir;

const RECORDS: usize = 100_000;

fn entries(count: usize) -> Vec<u8> {
    (0..count * NODE_SIZE).map(|i| (i % 251) as u8).collect()
}

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("read4");
    let dir = tempdir().unwrap();
    let config = TableConfig::new(dir.path());
    DiskTable::build(&config, &entries(RECORDS)).unwrap();
    let disk = DiskTable::open(&config, false).unwrap();
    let mem = MemTable::from_records(&entries(RECORDS)).unwrap();

    group.bench_function("disk_sequential", |b| {
        let mut pre = 0;
        b.iter(|| {
            pre = (pre + 1) % RECORDS;
            black_box(disk.read4(black_box(pre), 4).unwrap())
        });
    });

    group.bench_function("disk_strided", |b| {
        let mut pre = 0;
        b.iter(|| {
            pre = (pre + 7919) % RECORDS;
            black_box(disk.read4(black_box(pre), 4).unwrap())
        });
    });

    group.bench_function("mem_sequential", |b| {
        let mut pre = 0;
        b.iter(|| {
            pre = (pre + 1) % RECORDS;
            black_box(mem.read4(black_box(pre), 4).unwrap())
        });
    });

    group.finish();
}

fn bench_insert_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_delete");

    for count in [1usize, 16, 300] {
        let dir = tempdir().unwrap();
        let config = TableConfig::new(dir.path());
        DiskTable::build(&config, &entries(RECORDS)).unwrap();
        let mut disk = DiskTable::open(&config, true).unwrap();
        let batch = entries(count);

        group.bench_with_input(BenchmarkId::new("disk", count), &count, |b, &count| {
            b.iter(|| {
                disk.insert(RECORDS / 2, black_box(&batch)).unwrap();
                disk.delete(RECORDS / 2, count).unwrap();
            });
        });

        let mut mem = MemTable::from_records(&entries(RECORDS)).unwrap();
        group.bench_with_input(BenchmarkId::new("mem", count), &count, |b, &count| {
            b.iter(|| {
                mem.insert(RECORDS / 2, black_box(&batch)).unwrap();
                mem.delete(RECORDS / 2, count).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reads, bench_insert_delete);
criterion_main!(benches);
