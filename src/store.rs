//! The common store contract implemented by adapters, decorators and the
//! pool facade

use crate::errors::{Error, Result};

/// Uniform interface onto a single key-value backend.
///
/// Keys are UTF-8 strings, values are opaque byte vectors. Adapters override
/// the provided `increment`/`create` defaults when the backend can do better
/// than read-modify-write.
///
/// # Examples
///
/// ```
/// use polystore::adapters::Memory;
/// use polystore::Store;
///
/// # fn main() -> polystore::Result<()> {
/// let mut store = Memory::new();
/// store.store("color", b"red")?;
/// assert_eq!(store.load("color")?, Some(b"red".to_vec()));
/// assert_eq!(store.delete("color")?, Some(b"red".to_vec()));
/// assert!(!store.contains_key("color")?);
/// # Ok(())
/// # }
/// ```
pub trait Store: Send {
    /// Fetch the value stored at `key`.
    fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `value` at `key`, replacing any previous value.
    fn store(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the value at `key`, returning it if it existed.
    fn delete(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Whether a value exists at `key`.
    fn contains_key(&mut self, key: &str) -> Result<bool> {
        Ok(self.load(key)?.is_some())
    }

    /// Adjust the decimal integer at `key` by `amount` and return the new
    /// value. A missing key starts from zero; a non-numeric value is an
    /// [`Error::NotNumeric`].
    ///
    /// The default is a plain read-modify-write; adapters with atomic
    /// primitives override it.
    fn increment(&mut self, key: &str, amount: i64) -> Result<i64> {
        let current = match self.load(key)? {
            Some(bytes) => decimal(key, &bytes)?,
            None => None,
        };
        let value = current.unwrap_or(0) + amount;
        self.store(key, value.to_string().as_bytes())?;
        Ok(value)
    }

    /// Write `value` at `key` only if the key is absent. Returns `true`
    /// when the write happened.
    fn create(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        if self.contains_key(key)? {
            Ok(false)
        } else {
            self.store(key, value)?;
            Ok(true)
        }
    }

    /// Visit every key currently stored.
    fn each_key(&mut self, f: &mut dyn FnMut(&str)) -> Result<()>;

    /// Drop every entry.
    fn clear(&mut self) -> Result<()>;

    /// Release backend resources. Called once per handle when the pool
    /// retires it.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Factory capability consumed by the pool: produces one new store handle
/// per call, or fails. Failures propagate verbatim to the caller that
/// triggered creation.
pub trait Builder: Send + Sync + 'static {
    type Store: Store + 'static;

    fn build(&self) -> Result<Self::Store>;
}

/// Parses the decimal integer rendition of a value. Empty reads as absent.
pub(crate) fn decimal(key: &str, bytes: &[u8]) -> Result<Option<i64>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(Some)
        .ok_or_else(|| Error::NotNumeric(key.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parses_integers() {
        assert_eq!(decimal("k", b"42").unwrap(), Some(42));
        assert_eq!(decimal("k", b"-7").unwrap(), Some(-7));
        assert_eq!(decimal("k", b"").unwrap(), None);
    }

    #[test]
    fn decimal_rejects_garbage() {
        assert!(matches!(
            decimal("k", b"not a number"),
            Err(Error::NotNumeric(key)) if key == "k"
        ));
    }
}
