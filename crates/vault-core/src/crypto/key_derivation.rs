//! PIN-based key derivation using PBKDF2-HMAC-SHA256

use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

use super::{DerivedKey, KEY_LEN, SALT_LEN};
use crate::error::{Result, VaultError};

/// Lowest work factor accepted anywhere in the vault
pub const MIN_ITERATIONS: u32 = 100_000;

/// Work factor used when nothing else is configured
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Highest work factor accepted; a single derivation stays within seconds
pub const MAX_ITERATIONS: u32 = 2_000_000;

/// Stretches a low-entropy PIN into a 256-bit key.
///
/// The iteration count is fixed when the component is built; every call to
/// [`KeyDerivation::derive`] re-runs the full stretch, nothing is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDerivation {
    iterations: u32,
}

impl KeyDerivation {
    /// Create a derivation with the given work factor
    ///
    /// Fails with [`VaultError::Config`] outside
    /// [`MIN_ITERATIONS`]..=[`MAX_ITERATIONS`].
    pub fn new(iterations: u32) -> Result<Self> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
            return Err(VaultError::Config(format!(
                "kdf iterations must be between {} and {}, got {}",
                MIN_ITERATIONS, MAX_ITERATIONS, iterations
            )));
        }
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive a key from `pin` and `salt`
    ///
    /// Deterministic: the same PIN, salt and work factor always yield the
    /// same key. An empty PIN is accepted and simply yields a key.
    pub fn derive(&self, pin: &str, salt: &[u8; SALT_LEN]) -> DerivedKey {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, self.iterations, &mut key);
        let derived = DerivedKey::new(key);
        zeroize::Zeroize::zeroize(&mut key);
        derived
    }
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
