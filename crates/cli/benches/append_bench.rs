use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::Store;
use record::Record;
use tempfile::tempdir;

const N_RECORDS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn open_store(dir: &std::path::Path, limit: u64, sync: bool) -> Store {
    Store::open_path(&dir.join("bench.meta"), limit, sync).unwrap()
}

fn append_no_sync_benchmark(c: &mut Criterion) {
    c.bench_function("append_no_sync_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path(), 64 * 1024 * 1024, false);
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N_RECORDS {
                    store
                        .append(format!("key{}", i).into_bytes(), vec![b'x'; VALUE_SIZE])
                        .unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn append_with_rotation_benchmark(c: &mut Criterion) {
    c.bench_function("append_rotating_64k_segments_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path(), 64 * 1024, false);
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..N_RECORDS {
                    store
                        .append(format!("key{}", i).into_bytes(), vec![b'x'; VALUE_SIZE])
                        .unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn append_sync_benchmark(c: &mut Criterion) {
    c.bench_function("append_sync_100", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let store = open_store(dir.path(), 64 * 1024 * 1024, true);
                (dir, store)
            },
            |(_dir, store)| {
                for i in 0..100 {
                    store
                        .append(format!("key{}", i).into_bytes(), vec![b'x'; VALUE_SIZE])
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn record_encode_benchmark(c: &mut Criterion) {
    let rec = Record::new(1, b"key".to_vec(), vec![b'x'; VALUE_SIZE]);
    let mut buf = Vec::with_capacity(rec.encoded_len());
    c.bench_function("record_encode_100b", |b| {
        b.iter(|| {
            buf.clear();
            rec.encode_into(&mut buf).unwrap();
        })
    });
}

criterion_group!(
    benches,
    append_no_sync_benchmark,
    append_with_rotation_benchmark,
    append_sync_benchmark,
    record_encode_benchmark
);
criterion_main!(benches);
