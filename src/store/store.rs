//! Durable record of the last completed break.
//!
//! Only one value is persisted: the timestamp of the most recent break that
//! ran to completion. Snoozes, deferrals and pauses never touch it.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STATE_VERSION: u8 = 1;

pub trait LastBreakStore: Send {
    /// `None` means no break has ever completed.
    fn read_last_break(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
    fn write_last_break(&self, at: DateTime<Utc>) -> Result<(), StoreError>;
}

impl<T: LastBreakStore + Sync + ?Sized> LastBreakStore for std::sync::Arc<T> {
    fn read_last_break(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).read_last_break()
    }

    fn write_last_break(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).write_last_break(at)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default = "default_state_version")]
    version: u8,
    #[serde(default)]
    last_break: Option<DateTime<Utc>>,
}

fn default_state_version() -> u8 {
    STATE_VERSION
}

/// Stores the last break as a small JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/eyebreak/state.json`, or a relative file when no data dir exists.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("eyebreak"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LastBreakStore for JsonFileStore {
    fn read_last_break(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: PersistedState = serde_json::from_slice(&bytes)?;
        // The epoch is how an unset timestamp looks in older records.
        Ok(state.last_break.filter(|at| at.timestamp() != 0))
    }

    fn write_last_break(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let state = PersistedState {
            version: STATE_VERSION,
            last_break: Some(at),
        };
        let json = serde_json::to_string_pretty(&state)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store for scheduler tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    last_break: std::sync::Mutex<Option<DateTime<Utc>>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(last_break: Option<DateTime<Utc>>) -> Self {
        Self {
            last_break: std::sync::Mutex::new(last_break),
        }
    }
}

#[cfg(test)]
impl LastBreakStore for MemoryStore {
    fn read_last_break(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .last_break
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner()))
    }

    fn write_last_break(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        match self.last_break.lock() {
            Ok(mut guard) => *guard = Some(at),
            Err(poisoned) => *poisoned.into_inner() = Some(at),
        }
        Ok(())
    }
}
