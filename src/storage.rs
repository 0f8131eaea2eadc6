use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, PersistError};
use thiserror::Error;
use tracing::debug;

/// Key holding the user's Gemini API key.
pub const CREDENTIAL_KEY: &str = "gemini_api_key";
/// Key holding the theme flag, stored as `"true"` or `"false"`.
pub const THEME_KEY: &str = "dark_theme";
/// Key holding the JSON-serialized conversation history.
pub const HISTORY_KEY: &str = "chat_history";

const STORE_FILE_NAME: &str = "storage.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: PersistError,
    },

    #[error("failed to serialize value for key `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A string key-value store that outlives the process.
///
/// There are no transactional guarantees: the last writer wins.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Store backed by a single JSON object on disk.
///
/// The whole object is rewritten on every `set`, through a temporary file in
/// the same directory that is renamed over the old one.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    ///
    /// A missing store file is treated as an empty store.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir).map_err(|source| StorageError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let path = data_dir.join(STORE_FILE_NAME);
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| StorageError::Json {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        debug!("Opened store at {} with {} keys", path.display(), entries.len());

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let contents =
            serde_json::to_string_pretty(&self.entries).map_err(|source| StorageError::Json {
                path: self.path.clone(),
                source,
            })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(contents.as_bytes()).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&self.path)
            .map_err(|source| StorageError::Persist {
                path: self.path.clone(),
                source,
            })?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

/// Store that lives only as long as the value does.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
