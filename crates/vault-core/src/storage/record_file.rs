//! File-backed record storage
//!
//! The record lives in a single JSON file. Saves go to a sibling temp file
//! which is flushed to disk and then renamed over the target, so a crash
//! leaves either the old record or the new one, never a torn write.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{EncryptedRecord, RecordStore};
use crate::error::{Result, VaultError};

/// Default file name of the record inside the data directory
pub const DEFAULT_RECORD_FILE: &str = "credential.json";

/// Sibling of `path` used while writing it: the full file name plus `.tmp`
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Record store backed by one JSON file
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    /// Store the record at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the record under the default file name inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_RECORD_FILE))
    }

    /// Get the path of the record file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        temp_sibling(&self.path)
    }

    fn write_temp(&self, temp_path: &Path, contents: &[u8]) -> Result<()> {
        // A temp file left by an interrupted save may carry other permissions
        match fs::remove_file(temp_path) {
            Ok(()) => debug!("Removed stale temp file {:?}", temp_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }

    #[cfg(unix)]
    fn sync_parent(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
                tracing::warn!("Could not sync record directory {:?}: {}", parent, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) {}
}

impl RecordStore for FileRecordStore {
    fn load(&self) -> Result<Option<EncryptedRecord>> {
        if !self.exists() {
            debug!("No record file at {:?}", self.path);
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let record: EncryptedRecord = serde_json::from_str(&contents)
            .map_err(|e| VaultError::MalformedRecord(format!("record file is unreadable: {}", e)))?;

        debug!("Loaded {} record from {:?}", record.cipher, self.path);
        Ok(Some(record))
    }

    fn save(&self, record: &EncryptedRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_vec_pretty(record)?;
        let temp_path = self.temp_path();

        if let Err(e) = self
            .write_temp(&temp_path, &contents)
            .and_then(|_| fs::rename(&temp_path, &self.path).map_err(VaultError::from))
        {
            let _ = fs::remove_file(&temp_path);
            return Err(VaultError::Storage(format!(
                "failed to write record to {:?}: {}",
                self.path, e
            )));
        }
        self.sync_parent();

        debug!("Saved record to {:?}", self.path);
        Ok(())
    }

    fn delete(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.sync_parent();
                debug!("Deleted record at {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn backend_name(&self) -> &'static str {
        "Encrypted File Storage"
    }
}
