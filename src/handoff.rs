use std::{collections::HashMap, path::Path, sync::Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::criteria::SearchCriteria;
use crate::utils;

pub const CRITERIA_KEY: &str = "searchCriteria";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("scratch store error: {0}")]
    Store(String),
    #[error("stored criteria unreadable: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for HandoffError {
    fn from(err: rusqlite::Error) -> Self {
        HandoffError::Store(err.to_string())
    }
}

/// Key-value scratch space that outlives one view.
pub trait ScratchStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, HandoffError>;
    fn set(&self, key: &str, value: &str) -> Result<(), HandoffError>;
    fn clear(&self, key: &str) -> Result<(), HandoffError>;
}

#[derive(Default)]
pub struct MemoryScratch {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryScratch {
    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, HandoffError> {
        self.entries
            .lock()
            .map_err(|_| HandoffError::Store("scratch mutex poisoned".into()))
    }
}

impl ScratchStore for MemoryScratch {
    fn get(&self, key: &str) -> Result<Option<String>, HandoffError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HandoffError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), HandoffError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

pub struct SqliteScratch {
    conn: Mutex<Connection>,
}

impl SqliteScratch {
    pub fn open_default() -> Result<Self, HandoffError> {
        Self::open(&utils::database_path())
    }

    pub fn open(path: &Path) -> Result<Self, HandoffError> {
        utils::ensure_parent(path);
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, HandoffError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, HandoffError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scratch(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, HandoffError> {
        self.conn
            .lock()
            .map_err(|_| HandoffError::Store("scratch connection poisoned".into()))
    }
}

impl ScratchStore for SqliteScratch {
    fn get(&self, key: &str) -> Result<Option<String>, HandoffError> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM scratch WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HandoffError> {
        self.conn()?.execute(
            "INSERT INTO scratch (key, value, updated_at_utc)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at_utc = excluded.updated_at_utc",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), HandoffError> {
        self.conn()?
            .execute("DELETE FROM scratch WHERE key = ?1", params![key])?;
        Ok(())
    }
}

pub fn save_criteria(store: &dyn ScratchStore, criteria: &SearchCriteria) -> Result<(), HandoffError> {
    let payload =
        serde_json::to_string(criteria).map_err(|err| HandoffError::Corrupt(err.to_string()))?;
    store.set(CRITERIA_KEY, &payload)?;
    debug!(query = %criteria.query, "criteria handed off");
    Ok(())
}

/// Stores criteria for a later run only when they pass validation.
/// Returns whether anything was stored.
pub fn remember_criteria(
    store: &dyn ScratchStore,
    criteria: &SearchCriteria,
) -> Result<bool, HandoffError> {
    if !criteria.is_valid() {
        debug!(query = %criteria.query, "invalid criteria not remembered");
        return Ok(false);
    }
    save_criteria(store, criteria)?;
    Ok(true)
}

/// `Ok(None)` means nothing was handed off and the caller should return to intake.
pub fn load_criteria(store: &dyn ScratchStore) -> Result<Option<SearchCriteria>, HandoffError> {
    let Some(payload) = store.get(CRITERIA_KEY)? else {
        return Ok(None);
    };
    serde_json::from_str(&payload)
        .map(Some)
        .map_err(|err| HandoffError::Corrupt(err.to_string()))
}

pub fn clear_criteria(store: &dyn ScratchStore) -> Result<(), HandoffError> {
    store.clear(CRITERIA_KEY)
}
