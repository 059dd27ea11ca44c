//! Persistence for the vault's encrypted record

mod record;
mod record_file;
mod traits;

pub use record::{EncryptedRecord, RECORD_VERSION};
pub use record_file::{FileRecordStore, DEFAULT_RECORD_FILE};
pub(crate) use record_file::temp_sibling;
pub use traits::RecordStore;
