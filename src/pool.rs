//! Store facade over the pool: every operation borrows a handle, delegates
//! and returns it

use crate::config::PoolConfig;
use crate::errors::Result;
use crate::manager::{PoolManager, PooledStore};
use crate::metrics::PoolStats;
use crate::store::{Builder, Store};

/// A [`Store`] whose every operation checks a handle out of a
/// [`PoolManager`], delegates to it and checks it back in — on failure too,
/// since the borrowed handle is an RAII guard. No handle is held between
/// calls.
///
/// Clones share the same underlying pool.
///
/// # Examples
///
/// ```
/// use polystore::adapters::Memory;
/// use polystore::{Pool, PoolConfig, Store};
///
/// # fn main() -> polystore::Result<()> {
/// let mut pool = Pool::new(Memory::new(), PoolConfig::new().with_max(4))?;
///
/// pool.store("greeting", b"hello")?;
/// assert_eq!(pool.load("greeting")?, Some(b"hello".to_vec()));
///
/// pool.close()?; // shuts the pool down
/// # Ok(())
/// # }
/// ```
pub struct Pool<B: Builder> {
    manager: PoolManager<B>,
}

impl<B: Builder> Clone for Pool<B> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<B: Builder> Pool<B> {
    /// Builds a pool-backed store.
    pub fn new(builder: B, config: PoolConfig) -> Result<Self> {
        Ok(Self {
            manager: PoolManager::new(builder, config)?,
        })
    }

    /// The underlying pool manager, for shutdown control and observability.
    pub fn manager(&self) -> &PoolManager<B> {
        &self.manager
    }

    /// Snapshot of the underlying pool.
    pub fn stats(&self) -> PoolStats {
        self.manager.stats()
    }

    /// Borrows one handle for a run of several operations, bypassing the
    /// per-operation check-out.
    pub fn check_out(&self) -> Result<PooledStore<B>> {
        self.manager.check_out()
    }

    /// Gracefully stops the underlying pool.
    pub fn stop(&self) {
        self.manager.stop()
    }
}

impl<B: Builder> Store for Pool<B> {
    fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.manager.check_out()?;
        store.load(key)
    }

    fn store(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let mut store = self.manager.check_out()?;
        store.store(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.manager.check_out()?;
        store.delete(key)
    }

    fn contains_key(&mut self, key: &str) -> Result<bool> {
        let mut store = self.manager.check_out()?;
        store.contains_key(key)
    }

    fn increment(&mut self, key: &str, amount: i64) -> Result<i64> {
        let mut store = self.manager.check_out()?;
        store.increment(key, amount)
    }

    fn create(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        let mut store = self.manager.check_out()?;
        store.create(key, value)
    }

    fn each_key(&mut self, f: &mut dyn FnMut(&str)) -> Result<()> {
        let mut store = self.manager.check_out()?;
        store.each_key(f)
    }

    fn clear(&mut self) -> Result<()> {
        let mut store = self.manager.check_out()?;
        store.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.manager.stop();
        Ok(())
    }
}
