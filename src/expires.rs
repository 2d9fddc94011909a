//! Value expiration decorator

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::errors::{Error, Result};
use crate::store::Store;

const PLAIN: u8 = 0;
const EXPIRING: u8 = 1;

/// Wraps a store so values can carry an expiry deadline, enforced lazily:
/// an expired entry is evicted the next time it is read.
///
/// Entries are framed as a tag byte, an optional little-endian millisecond
/// deadline, and the value. `increment` bypasses the framing and works on
/// the raw inner value, so counters never expire.
///
/// # Examples
///
/// ```
/// use polystore::adapters::Memory;
/// use polystore::{Expires, Store};
/// use std::time::Duration;
///
/// # fn main() -> polystore::Result<()> {
/// let mut store = Expires::with_default_expires(Memory::new(), Duration::from_secs(300));
///
/// store.store("session", b"alice")?;
/// assert_eq!(store.load("session")?, Some(b"alice".to_vec()));
///
/// // Pin one entry forever regardless of the default.
/// store.store_with_expires("config", b"v1", None)?;
/// # Ok(())
/// # }
/// ```
pub struct Expires<S> {
    inner: S,
    default_expires: Option<Duration>,
}

impl<S: Store> Expires<S> {
    /// Wrap a store without a default expiry; entries only expire when
    /// stored through [`store_with_expires`](Self::store_with_expires).
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            default_expires: None,
        }
    }

    /// Wrap a store applying `expires` to every plain `store`.
    pub fn with_default_expires(inner: S, expires: Duration) -> Self {
        Self {
            inner,
            default_expires: Some(expires),
        }
    }

    /// Store with an explicit expiry, overriding the default. `None` keeps
    /// the entry forever.
    pub fn store_with_expires(
        &mut self,
        key: &str,
        value: &[u8],
        expires: Option<Duration>,
    ) -> Result<()> {
        self.inner.store(key, &encode_entry(value, deadline(expires)))
    }

    /// The wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn live_value(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.inner.load(key)? else {
            return Ok(None);
        };
        match decode_entry(key, &raw)? {
            (value, None) => Ok(Some(value)),
            (value, Some(at)) if now_millis() <= at => Ok(Some(value)),
            _ => {
                self.inner.delete(key)?;
                Ok(None)
            }
        }
    }
}

impl<S: Store> Store for Expires<S> {
    fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.live_value(key)
    }

    fn store(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.store_with_expires(key, value, self.default_expires)
    }

    fn delete(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.inner.delete(key)? else {
            return Ok(None);
        };
        match decode_entry(key, &raw)? {
            (value, None) => Ok(Some(value)),
            (value, Some(at)) if now_millis() <= at => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    fn contains_key(&mut self, key: &str) -> Result<bool> {
        Ok(self.live_value(key)?.is_some())
    }

    fn increment(&mut self, key: &str, amount: i64) -> Result<i64> {
        self.inner.increment(key, amount)
    }

    fn create(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        self.inner
            .create(key, &encode_entry(value, deadline(self.default_expires)))
    }

    fn each_key(&mut self, f: &mut dyn FnMut(&str)) -> Result<()> {
        self.inner.each_key(f)
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.clear()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn deadline(expires: Option<Duration>) -> Option<u64> {
    expires.map(|ttl| now_millis() + ttl.as_millis() as u64)
}

fn encode_entry(value: &[u8], deadline: Option<u64>) -> Vec<u8> {
    match deadline {
        None => {
            let mut entry = Vec::with_capacity(1 + value.len());
            entry.push(PLAIN);
            entry.extend_from_slice(value);
            entry
        }
        Some(at) => {
            let mut entry = Vec::with_capacity(9 + value.len());
            entry.push(EXPIRING);
            entry.extend_from_slice(&at.to_le_bytes());
            entry.extend_from_slice(value);
            entry
        }
    }
}

fn decode_entry(key: &str, raw: &[u8]) -> Result<(Vec<u8>, Option<u64>)> {
    match raw.split_first() {
        Some((&PLAIN, value)) => Ok((value.to_vec(), None)),
        Some((&EXPIRING, rest)) if rest.len() >= 8 => {
            let (stamp, value) = rest.split_at(8);
            let mut millis = [0u8; 8];
            millis.copy_from_slice(stamp);
            Ok((value.to_vec(), Some(u64::from_le_bytes(millis))))
        }
        _ => Err(Error::Corrupt(key.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Memory;
    use std::thread;

    #[test]
    fn values_without_expiry_persist() {
        let mut store = Expires::new(Memory::new());
        store.store("k", b"v").unwrap();
        assert_eq!(store.load("k").unwrap(), Some(b"v".to_vec()));
        assert!(store.contains_key("k").unwrap());
    }

    #[test]
    fn default_expiry_evicts_lazily() {
        let backend = Memory::new();
        let mut store =
            Expires::with_default_expires(backend.clone(), Duration::from_millis(50));
        store.store("k", b"v").unwrap();
        assert_eq!(store.load("k").unwrap(), Some(b"v".to_vec()));

        thread::sleep(Duration::from_millis(120));
        assert_eq!(store.load("k").unwrap(), None);
        // The read evicted the dead entry from the backend too.
        assert_eq!(backend.clone().load("k").unwrap(), None);
    }

    #[test]
    fn per_call_expiry_overrides_default() {
        let mut store =
            Expires::with_default_expires(Memory::new(), Duration::from_millis(50));
        store.store_with_expires("pinned", b"v", None).unwrap();

        thread::sleep(Duration::from_millis(120));
        assert_eq!(store.load("pinned").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn delete_returns_only_live_values() {
        let mut store = Expires::new(Memory::new());
        store
            .store_with_expires("dead", b"v", Some(Duration::from_millis(20)))
            .unwrap();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(store.delete("dead").unwrap(), None);

        store.store("live", b"v").unwrap();
        assert_eq!(store.delete("live").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn increment_bypasses_framing() {
        let backend = Memory::new();
        let mut store = Expires::with_default_expires(backend.clone(), Duration::from_millis(50));
        assert_eq!(store.increment("hits", 1).unwrap(), 1);
        assert_eq!(store.increment("hits", 1).unwrap(), 2);
        // Raw counter value, no frame.
        assert_eq!(backend.clone().load("hits").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn corrupt_frames_are_reported() {
        let backend = Memory::new();
        backend.clone().store("bad", b"").unwrap();
        let mut store = Expires::new(backend);
        assert!(matches!(store.load("bad"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn create_respects_existing_entries() {
        let mut store = Expires::new(Memory::new());
        assert!(store.create("k", b"first").unwrap());
        assert!(!store.create("k", b"second").unwrap());
        assert_eq!(store.load("k").unwrap(), Some(b"first".to_vec()));
    }
}
