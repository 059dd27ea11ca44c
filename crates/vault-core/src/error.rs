//! Error types for vault-core

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
///
/// The first four variants are the user-facing taxonomy. None of them carry
/// cryptographic library internals or secret material.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Stored credential is malformed: {0}")]
    MalformedRecord(String),

    /// Wrong PIN and tampered ciphertext are deliberately indistinguishable.
    #[error("Decryption failed - wrong PIN or corrupted credential")]
    DecryptionFailed,

    #[error("No credential stored")]
    NoCredential,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}
