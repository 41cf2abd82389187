use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::{ClientError, ClientResult};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Persistent home of the session's credentials.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> ClientResult<()>;

    fn clear(&self) -> ClientResult<()>;
}

type Entries = BTreeMap<String, String>;

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<Entries>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        let store = Self::new();
        {
            let mut entries = lock(&store.entries);
            entries.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
        }
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.entries).get(ACCESS_TOKEN_KEY).cloned()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.entries).get(REFRESH_TOKEN_KEY).cloned()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> ClientResult<()> {
        let mut entries = lock(&self.entries);
        entries.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
        entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}

/// Tokens kept in a small JSON file, keyed like browser local storage.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileTokenStore {
    pub fn open(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Entries::new(),
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable token file {:?}: {}", path, e);
                Entries::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| ClientError::Io(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.entries).get(ACCESS_TOKEN_KEY).cloned()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.entries).get(REFRESH_TOKEN_KEY).cloned()
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> ClientResult<()> {
        let mut entries = lock(&self.entries);
        entries.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
        entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
        self.persist(&entries)
    }

    fn clear(&self) -> ClientResult<()> {
        let mut entries = lock(&self.entries);
        entries.remove(ACCESS_TOKEN_KEY);
        entries.remove(REFRESH_TOKEN_KEY);
        self.persist(&entries)
    }
}
