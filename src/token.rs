//! Persisted bearer token.
//!
//! The token is the only thing this crate ever writes to disk. It lives in a
//! small JSON key-value file under the fixed key [`TOKEN_KEY`]; writes are
//! atomic via a temp-file rename so a crash mid-write can't corrupt it.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Key the token is stored under.
pub const TOKEN_KEY: &str = "auth_token";

/// Key-value storage for the session's bearer token.
pub trait TokenStore: Send + Sync {
    /// The stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` for unexpected I/O failures. A missing or
    /// unreadable file is `Ok(None)`.
    fn load(&self) -> io::Result<Option<String>>;

    /// Persist `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the write fails.
    fn save(&self, token: &str) -> io::Result<()>;

    /// Forget the stored token.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the write fails.
    fn clear(&self) -> io::Result<()>;
}

/// Token store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the token in the JSON file at `path`. The file and its parent
    /// directory are created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> io::Result<BTreeMap<String, String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "token file is not valid JSON; treating as empty"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(map)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.read_map()?.remove(TOKEN_KEY))
    }

    fn save(&self, token: &str) -> io::Result<()> {
        let mut map = self.read_map()?;
        map.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_map(&map)
    }

    fn clear(&self) -> io::Result<()> {
        let mut map = self.read_map()?;
        if map.remove(TOKEN_KEY).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-process token store. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl MemoryTokenStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> io::Error {
    io::Error::other("token lock poisoned")
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.token.read().map_err(|_| poisoned())?.clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.token.write().map_err(|_| poisoned())? = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.token.write().map_err(|_| poisoned())? = None;
        Ok(())
    }
}
