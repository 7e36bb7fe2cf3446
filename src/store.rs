//! Durable persistence for the bearer-token pair.
//!
//! The store holds two opaque strings under stable keys and nothing else:
//! no decoding, no validation, no lifecycle logic. Writers are already
//! serialized by the session manager and the refresh coordinator, so
//! last-write-wins semantics are sufficient here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Error;

/// Which of the two persisted credentials a call refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived credential attached to requests
    Access,
    /// Longer-lived credential used only to mint a new access token
    Refresh,
}

impl TokenKind {
    /// The stable storage key for this credential
    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Key/value persistence for the current token pair
pub trait TokenStore: Send + Sync {
    /// Retrieve a token, or `None` if absent
    fn get(&self, kind: TokenKind) -> Result<Option<String>, Error>;

    /// Store a token
    fn set(&self, kind: TokenKind, value: &str) -> Result<(), Error>;

    /// Remove a token
    fn clear(&self, kind: TokenKind) -> Result<(), Error>;

    /// Remove both tokens
    fn clear_all(&self) -> Result<(), Error>;
}

/// File-backed store surviving process restart.
///
/// The token pair is kept as a small JSON object. Writes go through a
/// sibling temp file and a rename so a crash mid-write never leaves a
/// truncated file behind.
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Create a store backed by the given file path.
    ///
    /// The file is created lazily on first write; a missing file reads as
    /// an empty store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<HashMap<String, String>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(Error::storage),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(Error::storage(err)),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), Error> {
        let raw = serde_json::to_string(map).map_err(Error::storage)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(Error::storage)?;
            }
        }
        fs::write(&tmp, raw).map_err(Error::storage)?;
        fs::rename(&tmp, &self.path).map_err(Error::storage)
    }

    /// The file this store persists to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_map()?.remove(kind.key()))
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.read_map()?;
        map.insert(kind.key().to_string(), value.to_string());
        self.write_map(&map)
    }

    fn clear(&self, kind: TokenKind) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.read_map()?;
        if map.remove(kind.key()).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::storage(err)),
        }
    }
}

/// In-memory store for tests and ephemeral clients
#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<&'static str, String>>,
}

impl MemoryTokenStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>, Error> {
        Ok(self.values.lock().unwrap().get(kind.key()).cloned())
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<(), Error> {
        self.values.lock().unwrap().insert(kind.key(), value.to_string());
        Ok(())
    }

    fn clear(&self, kind: TokenKind) -> Result<(), Error> {
        self.values.lock().unwrap().remove(kind.key());
        Ok(())
    }

    fn clear_all(&self) -> Result<(), Error> {
        self.values.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get(TokenKind::Access).unwrap(), None);

        store.set(TokenKind::Access, "a1").unwrap();
        store.set(TokenKind::Refresh, "r1").unwrap();
        assert_eq!(store.get(TokenKind::Access).unwrap(), Some("a1".to_string()));
        assert_eq!(store.get(TokenKind::Refresh).unwrap(), Some("r1".to_string()));

        store.clear(TokenKind::Access).unwrap();
        assert_eq!(store.get(TokenKind::Access).unwrap(), None);
        assert_eq!(store.get(TokenKind::Refresh).unwrap(), Some("r1".to_string()));

        store.clear_all().unwrap();
        assert_eq!(store.get(TokenKind::Refresh).unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::new(&path);
        store.set(TokenKind::Access, "a1").unwrap();
        store.set(TokenKind::Refresh, "r1").unwrap();
        drop(store);

        let reopened = FileTokenStore::new(&path);
        assert_eq!(
            reopened.get(TokenKind::Access).unwrap(),
            Some("a1".to_string())
        );
        assert_eq!(
            reopened.get(TokenKind::Refresh).unwrap(),
            Some("r1".to_string())
        );
    }

    #[test]
    fn test_file_store_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get(TokenKind::Refresh).unwrap(), None);
        // Clearing an absent token is a no-op, not an error
        store.clear(TokenKind::Access).unwrap();
        store.clear_all().unwrap();
    }

    #[test]
    fn test_file_store_clear_all_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::new(&path);
        store.set(TokenKind::Access, "a1").unwrap();
        store.clear_all().unwrap();

        assert!(!path.exists());
        assert_eq!(store.get(TokenKind::Access).unwrap(), None);
    }

    #[test]
    fn test_file_store_overwrite_is_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.set(TokenKind::Access, "old").unwrap();
        store.set(TokenKind::Access, "new").unwrap();
        assert_eq!(
            store.get(TokenKind::Access).unwrap(),
            Some("new".to_string())
        );
    }
}
