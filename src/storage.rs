//! Snapshot persistence.
//!
//! The last run record is stored per country, either as a flat JSON file or
//! in a sled database. Loading turns it back into a [`Snapshot`].

use crate::record::RunRecord;
use crate::snapshot::Snapshot;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Get/put of the single record the pipeline falls back on.
pub trait SnapshotStore: Send + Sync {
    /// The last stored record, if any.
    fn load_record(&self) -> Result<Option<RunRecord>, StorageError>;

    /// Overwrite the stored record.
    fn save(&self, record: &RunRecord) -> Result<(), StorageError>;

    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.load_record()?.map(|r| r.to_snapshot()))
    }

    /// Countries with a stored record in this backend.
    fn countries(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.load_record()?.map(|r| r.country).into_iter().collect())
    }
}

/// Flat JSON file holding the last record.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load_record(&self) -> Result<Option<RunRecord>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, record: &RunRecord) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Replace atomically: readers see the old or the new record, never a partial one
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Sled-based storage, keyed by country name.
pub struct SledStore {
    db: sled::Db,
    key: String,
}

impl SledStore {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P, country: &str) -> Result<Self, StorageError> {
        Ok(Self::with_db(sled::open(path)?, country))
    }

    /// Bind an already open database to one country
    pub fn with_db(db: sled::Db, country: &str) -> Self {
        Self {
            db,
            key: country.to_lowercase(),
        }
    }
}

impl SnapshotStore for SledStore {
    fn load_record(&self) -> Result<Option<RunRecord>, StorageError> {
        match self.db.get(self.key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &RunRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.db.insert(self.key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    /// Every country in the database, not only the one this store is bound to
    fn countries(&self) -> Result<Vec<String>, StorageError> {
        let mut countries = Vec::new();
        for item in self.db.iter() {
            let (_key, value) = item?;
            let record: RunRecord = serde_json::from_slice(&value)?;
            countries.push(record.country);
        }
        Ok(countries)
    }
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: RunRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl SnapshotStore for MemoryStore {
    fn load_record(&self) -> Result<Option<RunRecord>, StorageError> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, record: &RunRecord) -> Result<(), StorageError> {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(record.clone());
        Ok(())
    }
}
