//! In-process concurrent map backend

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::errors::Result;
use crate::store::{decimal, Builder, Store};

/// Concurrent in-memory backend.
///
/// Clones share the same underlying map, so a `Memory` doubles as a
/// [`Builder`] handing out views onto one logical store — the shape a pool
/// of handles needs.
///
/// # Examples
///
/// ```
/// use polystore::adapters::Memory;
/// use polystore::Store;
///
/// # fn main() -> polystore::Result<()> {
/// let mut store = Memory::new();
/// store.store("answer", b"42")?;
///
/// let mut view = store.clone();
/// assert_eq!(view.load("answer")?, Some(b"42".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct Memory {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl Memory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for Memory {
    fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn store(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.remove(key).map(|(_, value)| value))
    }

    fn contains_key(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn increment(&mut self, key: &str, amount: i64) -> Result<i64> {
        // The entry guard holds the shard lock, making the
        // read-modify-write atomic across handles.
        let mut entry = self.entries.entry(key.to_owned()).or_default();
        let value = decimal(key, entry.value())?.unwrap_or(0) + amount;
        *entry.value_mut() = value.to_string().into_bytes();
        Ok(value)
    }

    fn create(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value.to_vec());
                Ok(true)
            }
        }
    }

    fn each_key(&mut self, f: &mut dyn FnMut(&str)) -> Result<()> {
        for entry in self.entries.iter() {
            f(entry.key());
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

impl Builder for Memory {
    type Store = Memory;

    fn build(&self) -> Result<Memory> {
        Ok(self.clone())
    }
}
