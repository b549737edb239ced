//! Persisted configuration records
//!
//! Each record is a JSON file named after the record in the record directory.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use warden_shared::SecureLock;

/// Record names
pub const PRIMARY_CONFIG: &str = "primary-config";
pub const SECONDARY_CONFIG: &str = "secondary-config";
pub const SECURE_LOCK: &str = "secure-lock";
pub const SETUP: &str = "setup";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record {name}: I/O error: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Record {name}: invalid JSON: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Small named-record store backed by a directory
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Read a record, `None` if absent
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, RecordError> {
        let bytes = match std::fs::read(self.path(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RecordError::Io {
                    name: name.into(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| RecordError::Json {
                name: name.into(),
                source,
            })
    }

    /// Write a record, replacing any previous value
    pub fn write<T: Serialize>(&self, name: &str, record: &T) -> Result<(), RecordError> {
        let io = |source| RecordError::Io {
            name: name.into(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io)?;
        let json = serde_json::to_vec_pretty(record).map_err(|source| RecordError::Json {
            name: name.into(),
            source,
        })?;

        // Write then rename so a crash never leaves half a record
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, self.path(name)).map_err(io)?;

        debug!("Record {} written", name);
        Ok(())
    }

    /// Delete a record; deleting an absent record is not an error
    pub fn delete(&self, name: &str) -> Result<(), RecordError> {
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RecordError::Io {
                name: name.into(),
                source,
            }),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn add_secure_lock(&self) -> Result<(), RecordError> {
        self.write(SECURE_LOCK, &SecureLock::now())
    }

    pub fn delete_secure_lock(&self) -> Result<(), RecordError> {
        self.delete(SECURE_LOCK)
    }

    pub fn is_secure_lock(&self) -> bool {
        self.exists(SECURE_LOCK)
    }
}
