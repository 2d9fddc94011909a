// polystore - uniform key-value storage with pooled backend stores
// Run: cargo run

use polystore::adapters::Memory;
use polystore::{Pool, PoolConfig, Store};

fn main() -> polystore::Result<()> {
    println!("=== polystore ===");

    let mut pool = Pool::new(Memory::new(), PoolConfig::new().with_max(4))?;

    pool.store("greeting", b"hello")?;
    println!("greeting = {:?}", pool.load("greeting")?);

    let stats = pool.stats();
    println!(
        "stores: {}, available: {}, waiting: {}",
        stats.stores, stats.available, stats.waiting
    );

    pool.stop();
    Ok(())
}
