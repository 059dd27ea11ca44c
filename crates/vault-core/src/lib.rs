//! # vault-core
//!
//! PIN-gated credential vault for the deck generator:
//! - PBKDF2-HMAC-SHA256 key derivation from a user PIN
//! - AES-256-GCM encryption, with AES-256-CBC kept for legacy records
//! - Atomic single-record file storage
//! - Zeroize-on-drop handling of derived keys and decrypted secrets

pub mod credential;
pub mod crypto;
pub mod error;
pub mod settings;
pub mod shared;
pub mod storage;
mod vault;

pub use credential::CredentialUpdate;
pub use crypto::{CipherMode, CredentialCipher, DerivedKey, KeyDerivation, SecretString};
pub use error::{Result, VaultError};
pub use settings::{Settings, VaultSettings};
pub use shared::SharedVault;
pub use storage::{EncryptedRecord, FileRecordStore, RecordStore};
pub use vault::{CredentialVault, VaultState};
