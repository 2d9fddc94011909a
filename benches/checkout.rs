// Pool check-out/check-in overhead with an in-memory store.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use polystore::adapters::Memory;
use polystore::{PoolConfig, PoolManager};

fn checkout_hot_path(c: &mut Criterion) {
    let manager = PoolManager::new(Memory::new(), PoolConfig::new().with_max(8)).unwrap();

    c.bench_function("check_out_check_in", |b| {
        b.iter(|| {
            let store = manager.check_out().unwrap();
            black_box(&store);
        })
    });

    manager.kill();
}

fn checkout_contended(c: &mut Criterion) {
    let manager = PoolManager::new(Memory::new(), PoolConfig::new().with_max(4)).unwrap();

    c.bench_function("check_out_contended", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for _ in 0..8 {
                    let manager = manager.clone();
                    scope.spawn(move || {
                        let store = manager.check_out().unwrap();
                        black_box(&store);
                    });
                }
            });
        })
    });

    manager.kill();
}

criterion_group!(benches, checkout_hot_path, checkout_contended);
criterion_main!(benches);
