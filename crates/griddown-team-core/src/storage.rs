//! Key-value settings store.
//!
//! The engine persists a single JSON snapshot through [`SettingsStore`].
//! Two implementations ship with the crate:
//! - [`RedbStore`]: ACID file-backed store using redb
//! - [`MemoryStore`]: process-local map, for tests and ephemeral hosts

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use redb::{Database, TableDefinition};

use crate::error::TeamError;

const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// Get/set persistence boundary.
///
/// Values are opaque bytes; the engine writes UTF-8 JSON.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TeamError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), TeamError>;

    /// Delete `key`; missing keys are not an error
    async fn remove(&self, key: &str) -> Result<(), TeamError>;
}

/// Settings store backed by a redb database file
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<RwLock<Database>>,
}

impl RedbStore {
    /// Open or create the database at `path`.
    ///
    /// Creates the parent directory and the settings table if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TeamError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SETTINGS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    fn get_sync(&self, key: &str) -> Result<Option<Vec<u8>>, TeamError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn set_sync(&self, key: &str, value: &[u8]) -> Result<(), TeamError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_sync(&self, key: &str) -> Result<(), TeamError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for RedbStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TeamError> {
        self.get_sync(key)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), TeamError> {
        self.set_sync(key, value)
    }

    async fn remove(&self, key: &str) -> Result<(), TeamError> {
        self.remove_sync(key)
    }
}

/// In-memory settings store.
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the engine wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TeamError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), TeamError> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), TeamError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
