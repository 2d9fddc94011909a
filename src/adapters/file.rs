//! Filesystem backend: one file per key

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{Error, Result};
use crate::store::{decimal, Builder, Store};

/// Distinguishes temp files and clear()-renamed directories across handles.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem backend keeping one file per key under a directory.
///
/// Keys are percent-encoded into file names so arbitrary strings round-trip;
/// writes go through a temp file and an atomic rename. Clones point at the
/// same directory, so a `FileStore` doubles as a [`Builder`] of handles onto
/// one backend.
///
/// # Examples
///
/// ```no_run
/// use polystore::adapters::FileStore;
/// use polystore::Store;
///
/// # fn main() -> polystore::Result<()> {
/// let mut store = FileStore::new("/var/lib/myapp/cache")?;
/// store.store("session/alice", b"token")?;
/// assert_eq!(store.load("session/alice")?, Some(b"token".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!(
            ".value-{}-{}",
            process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ))
    }
}

impl Store for FileStore {
    fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn store(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let temp = self.temp_path();
        let result = fs::write(&temp, value).and_then(|()| fs::rename(&temp, self.key_path(key)));
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result.map_err(Error::from)
    }

    fn delete(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key);
        match fs::read(&path) {
            Ok(value) => {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                Ok(Some(value))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn contains_key(&mut self, key: &str) -> Result<bool> {
        Ok(self.key_path(key).is_file())
    }

    fn increment(&mut self, key: &str, amount: i64) -> Result<i64> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.key_path(key))?;
        // Advisory lock serializes read-modify-write across handles and
        // processes; released when the file drops.
        file.lock()?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        let value = decimal(key, &content)?.unwrap_or(0) + amount;
        let rendered = value.to_string();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(rendered.as_bytes())?;
        file.set_len(rendered.len() as u64)?;
        Ok(value)
    }

    fn create(&mut self, key: &str, value: &[u8]) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.key_path(key))
        {
            Ok(mut file) => {
                file.write_all(value)?;
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn each_key(&mut self, f: &mut dyn FnMut(&str)) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = decode_key(name) {
                f(&key);
            }
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        // Rename the whole directory aside, recreate it, then remove the
        // old tree; readers racing the clear see either world, never a
        // half-empty one.
        let mut aside = OsString::from(self.dir.as_os_str());
        aside.push(format!(
            "-{}-{}",
            process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let aside = PathBuf::from(aside);
        match fs::rename(&self.dir, &aside) {
            Ok(()) => {
                fs::create_dir_all(&self.dir)?;
                fs::remove_dir_all(&aside)?;
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Builder for FileStore {
    type Store = FileStore;

    fn build(&self) -> Result<FileStore> {
        Ok(self.clone())
    }
}

/// Encodes a key into a file name; everything outside `[A-Za-z0-9_-]`
/// becomes `%XX`, so encoded names never start with a dot.
fn encode_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for &byte in key.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => name.push(byte as char),
            _ => name.push_str(&format!("%{byte:02X}")),
        }
    }
    name
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn round_trip() {
        let (_dir, mut store) = open_temp();
        store.store("a", b"1").unwrap();
        assert_eq!(store.load("a").unwrap(), Some(b"1".to_vec()));
        assert!(store.contains_key("a").unwrap());
        assert_eq!(store.delete("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.load("a").unwrap(), None);
        assert_eq!(store.delete("a").unwrap(), None);
    }

    #[test]
    fn awkward_keys_round_trip() {
        let (_dir, mut store) = open_temp();
        let keys = ["a/b/c", "..", "with space", "per%cent", "ütf8"];
        for key in keys {
            store.store(key, key.as_bytes()).unwrap();
        }
        for key in keys {
            assert_eq!(store.load(key).unwrap(), Some(key.as_bytes().to_vec()));
        }

        let mut seen = Vec::new();
        store.each_key(&mut |k| seen.push(k.to_owned())).unwrap();
        seen.sort();
        let mut expected: Vec<_> = keys.iter().map(|k| k.to_string()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn create_is_exclusive() {
        let (_dir, mut store) = open_temp();
        assert!(store.create("k", b"first").unwrap());
        assert!(!store.create("k", b"second").unwrap());
        assert_eq!(store.load("k").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn increment_persists_across_handles() {
        let (_dir, store) = open_temp();
        let mut first = store.build().unwrap();
        let mut second = store.build().unwrap();
        assert_eq!(first.increment("n", 2).unwrap(), 2);
        assert_eq!(second.increment("n", 3).unwrap(), 5);
        assert_eq!(first.load("n").unwrap(), Some(b"5".to_vec()));
    }

    #[test]
    fn clear_empties_the_directory() {
        let (_dir, mut store) = open_temp();
        store.store("a", b"1").unwrap();
        store.store("b", b"2").unwrap();
        store.clear().unwrap();
        assert_eq!(store.load("a").unwrap(), None);

        let mut keys = Vec::new();
        store.each_key(&mut |k| keys.push(k.to_owned())).unwrap();
        assert!(keys.is_empty());

        // The store stays usable after a clear.
        store.store("c", b"3").unwrap();
        assert_eq!(store.load("c").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn key_codec_is_reversible() {
        for key in ["plain", "a/b", "%", "", "dot.dot"] {
            assert_eq!(decode_key(&encode_key(key)).as_deref(), Some(key));
        }
        assert!(!encode_key(".hidden").starts_with('.'));
    }
}
