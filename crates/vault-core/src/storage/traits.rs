//! Storage trait definitions

use super::EncryptedRecord;
use crate::error::Result;

/// Backend holding the vault's single encrypted record
pub trait RecordStore: Send + Sync {
    /// Load the record, `None` when nothing is stored
    fn load(&self) -> Result<Option<EncryptedRecord>>;

    /// Replace any existing record wholesale
    fn save(&self, record: &EncryptedRecord) -> Result<()>;

    /// Delete the record, returning whether one existed
    fn delete(&self) -> Result<bool>;

    /// Check whether a record exists without reading it
    fn exists(&self) -> bool;

    /// Get a human-readable name for this storage backend
    fn backend_name(&self) -> &'static str;
}
