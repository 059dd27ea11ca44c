//! Cryptographic primitives for the credential vault
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 key derivation from a PIN
//! - AES-256-GCM authenticated encryption (AES-256-CBC for legacy records)
//! - Secure memory handling with zeroize

mod encryption;
mod key_derivation;
mod secure_memory;

pub use encryption::{CipherMode, CredentialCipher};
pub(crate) use encryption::{decode_field, decode_fixed, encode_field};
pub use key_derivation::{
    generate_salt, KeyDerivation, DEFAULT_ITERATIONS, MAX_ITERATIONS, MIN_ITERATIONS,
};
pub use secure_memory::{DerivedKey, SecretString};

/// Derived key length (AES-256)
pub const KEY_LEN: usize = 32;
/// Salt length stored with each record
pub const SALT_LEN: usize = 16;
/// IV / nonce length stored with each record
pub const IV_LEN: usize = 16;
/// AES block size
pub const BLOCK_LEN: usize = 16;
/// GCM authentication tag length
pub const TAG_LEN: usize = 16;
