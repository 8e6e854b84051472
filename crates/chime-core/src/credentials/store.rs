//! Credential storage abstraction
//!
//! Opaque string key-value storage for the account identifier and the device
//! and session tokens. Values are never validated; a successful `set` or
//! `clear` means the change is durable for the backing medium.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::StorageError;

// ----------------------------------------------------------------------------
// Storage Keys
// ----------------------------------------------------------------------------

/// Account identifier (email address)
pub const ACCOUNT_EMAIL: &str = "account-email";
/// Per-installation device token, stable for a given account
pub const DEVICE_TOKEN: &str = "device-token";
/// Session token issued by the service after authentication
pub const SESSION_TOKEN: &str = "session-token";

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Key-value storage for session credentials
pub trait CredentialStore: Send {
    /// Read a value; `None` when the key was never set or was cleared
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, durable when this returns `Ok`
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value; clearing an absent key succeeds
    fn clear(&mut self, key: &str) -> Result<(), StorageError>;
}

// ----------------------------------------------------------------------------
// Memory Storage Implementation
// ----------------------------------------------------------------------------

/// In-memory credential store for tests and ephemeral runs
#[derive(Debug, Clone)]
pub struct MemoryCredentialStore {
    data: BTreeMap<String, String>,
    available: bool,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCredentialStore {
    /// Create an empty, available store
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            available: true,
        }
    }

    /// Create a store pre-populated with key/value pairs
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut store = Self::new();
        for (key, value) in entries {
            store.data.insert(key.to_string(), value.to_string());
        }
        store
    }

    /// Toggle availability; an unavailable store fails every operation
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.data.remove(key);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Storage Implementation
// ----------------------------------------------------------------------------

/// TOML-file backed credential store
///
/// The whole document is held in memory and rewritten on every change via a
/// temporary sibling file and a rename. Keys this crate does not know about
/// (window geometry, last selected channel) are carried through untouched.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    document: toml::Table,
}

impl FileCredentialStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(contents) => contents
                .parse::<toml::Table>()
                .map_err(|e| StorageError::Corrupt {
                    reason: format!("{}: {}", path.display(), e),
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = document.len(), "Opened credential file");
        Ok(Self { path, document })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = toml::to_string(&self.document).map_err(|e| StorageError::Corrupt {
            reason: e.to_string(),
        })?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.document.get(key) {
            None => Ok(None),
            Some(toml::Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(StorageError::Corrupt {
                reason: format!("{} is a {}, expected a string", key, other.type_str()),
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = self
            .document
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        if let Err(e) = self.persist() {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => self.document.insert(key.to_string(), old),
                None => self.document.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<(), StorageError> {
        let Some(previous) = self.document.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist() {
            self.document.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
