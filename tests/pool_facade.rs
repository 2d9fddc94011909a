//! Store contract behavior of the pool facade.

use std::time::Duration;

use polystore::adapters::Memory;
use polystore::{Error, Pool, PoolConfig, Store};

fn pool() -> Pool<Memory> {
    Pool::new(
        Memory::new(),
        PoolConfig::new().with_max(2).with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

#[test]
fn operations_round_trip_through_the_pool() {
    let mut pool = pool();

    pool.store("a", b"1").unwrap();
    assert_eq!(pool.load("a").unwrap(), Some(b"1".to_vec()));
    assert!(pool.contains_key("a").unwrap());

    assert!(pool.create("b", b"2").unwrap());
    assert!(!pool.create("b", b"3").unwrap());

    assert_eq!(pool.increment("n", 4).unwrap(), 4);
    assert_eq!(pool.increment("n", 1).unwrap(), 5);

    let mut keys = Vec::new();
    pool.each_key(&mut |k| keys.push(k.to_owned())).unwrap();
    keys.sort();
    assert_eq!(keys, ["a", "b", "n"]);

    assert_eq!(pool.delete("a").unwrap(), Some(b"1".to_vec()));
    pool.clear().unwrap();
    assert_eq!(pool.load("b").unwrap(), None);

    pool.stop();
}

#[test]
fn every_operation_returns_its_handle() {
    let mut pool = pool();

    for i in 0..10 {
        pool.store(&format!("k{i}"), b"v").unwrap();
        let stats = pool.stats();
        assert_eq!(
            stats.available, stats.stores,
            "a handle leaked after operation {i}"
        );
    }
    pool.stop();
}

#[test]
fn handle_is_returned_when_the_operation_fails() {
    let mut pool = pool();

    pool.store("word", b"pear").unwrap();
    assert!(matches!(pool.increment("word", 1), Err(Error::NotNumeric(_))));

    let stats = pool.stats();
    assert_eq!(stats.available, stats.stores);
    assert!(stats.stores > 0);

    // The pool still serves requests after the failure.
    assert_eq!(pool.load("word").unwrap(), Some(b"pear".to_vec()));
    pool.stop();
}

#[test]
fn clones_share_one_backend_and_pool() {
    let mut pool = pool();
    let mut other = pool.clone();

    pool.store("shared", b"yes").unwrap();
    assert_eq!(other.load("shared").unwrap(), Some(b"yes".to_vec()));

    let stats = pool.stats();
    let other_stats = other.stats();
    assert_eq!(stats.stores, other_stats.stores);

    pool.stop();
}

#[test]
fn close_stops_the_underlying_pool() {
    let mut pool = pool();
    pool.store("k", b"v").unwrap();

    pool.close().unwrap();
    assert!(matches!(pool.load("k"), Err(Error::Shutdown)));
    assert!(matches!(pool.check_out(), Err(Error::Shutdown)));
}

#[test]
fn explicit_check_out_batches_operations() {
    let pool = pool();

    let mut store = pool.check_out().unwrap();
    store.store("a", b"1").unwrap();
    store.store("b", b"2").unwrap();
    assert_eq!(pool.stats().checked_out(), 1);
    drop(store);

    assert_eq!(pool.stats().checked_out(), 0);
    pool.stop();
}
