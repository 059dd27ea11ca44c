//! The persisted credential record
//!
//! Binary fields are stored base64-encoded, exactly as they are handed to
//! [`CredentialCipher::decrypt`], so a malformed field surfaces as
//! [`VaultError::MalformedRecord`] at decryption time rather than at load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{
    decode_field, decode_fixed, encode_field, CipherMode, CredentialCipher, KeyDerivation,
    SecretString, DEFAULT_ITERATIONS, IV_LEN, MAX_ITERATIONS, MIN_ITERATIONS, SALT_LEN,
};
use crate::error::{Result, VaultError};

/// Current record format version
pub const RECORD_VERSION: u32 = 2;

/// Field names of the legacy three-line keys file
const LEGACY_CIPHERTEXT: &str = "ENCRYPTED_API_KEY";
const LEGACY_SALT: &str = "SALT";
const LEGACY_IV: &str = "IV";

/// Encrypted credential as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Record format version
    pub version: u32,
    /// Cipher the record was sealed with
    pub cipher: CipherMode,
    /// PBKDF2 work factor the key was derived with
    pub kdf_iterations: u32,
    /// Base64 ciphertext (GCM output includes the tag)
    #[serde(rename = "encrypted_api_key")]
    pub ciphertext: String,
    /// Base64 salt, 16 bytes
    pub salt: String,
    /// Base64 IV, 16 bytes
    pub iv: String,
    /// When the record was written (absent for imported legacy records)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

impl EncryptedRecord {
    /// Build a record from freshly sealed bytes
    pub fn new(
        cipher: &CredentialCipher,
        ciphertext: &[u8],
        salt: &[u8; SALT_LEN],
        iv: &[u8; IV_LEN],
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            cipher: cipher.mode(),
            kdf_iterations: cipher.kdf().iterations(),
            ciphertext: encode_field(ciphertext),
            salt: encode_field(salt),
            iv: encode_field(iv),
            stored_at: Some(Utc::now()),
        }
    }

    /// Parse a legacy keys file
    ///
    /// The format is three `NAME = "base64"` lines (`ENCRYPTED_API_KEY`,
    /// `SALT`, `IV`). Blank lines, `#` comments and unknown names are
    /// ignored. Legacy records are AES-256-CBC at 100 000 iterations.
    pub fn from_legacy_keys(contents: &str) -> Result<Self> {
        let mut ciphertext = None;
        let mut salt = None;
        let mut iv = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());
            match name.trim() {
                LEGACY_CIPHERTEXT => ciphertext = Some(value.to_string()),
                LEGACY_SALT => salt = Some(value.to_string()),
                LEGACY_IV => iv = Some(value.to_string()),
                _ => {}
            }
        }

        let missing = |name: &str| VaultError::MalformedRecord(format!("legacy keys file has no {}", name));

        Ok(Self {
            version: RECORD_VERSION,
            cipher: CipherMode::Aes256Cbc,
            kdf_iterations: DEFAULT_ITERATIONS,
            ciphertext: ciphertext.ok_or_else(|| missing(LEGACY_CIPHERTEXT))?,
            salt: salt.ok_or_else(|| missing(LEGACY_SALT))?,
            iv: iv.ok_or_else(|| missing(LEGACY_IV))?,
            stored_at: None,
        })
    }

    /// Reject records this build cannot interpret
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > RECORD_VERSION {
            return Err(VaultError::MalformedRecord(format!(
                "unsupported record version {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Cipher configured with this record's mode and work factor
    pub fn cipher(&self) -> Result<CredentialCipher> {
        let kdf = KeyDerivation::new(self.kdf_iterations).map_err(|_| {
            VaultError::MalformedRecord(format!(
                "record work factor {} is outside {}..={}",
                self.kdf_iterations, MIN_ITERATIONS, MAX_ITERATIONS
            ))
        })?;
        Ok(CredentialCipher::new(self.cipher, kdf))
    }

    /// Decrypt the record under `pin`
    pub fn open(&self, pin: &str) -> Result<SecretString> {
        self.validate()?;
        self.cipher()?
            .decrypt(pin, &self.ciphertext, &self.salt, &self.iv)
    }

    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        decode_field("ciphertext", &self.ciphertext)
    }

    pub fn salt_bytes(&self) -> Result<[u8; SALT_LEN]> {
        decode_fixed("salt", &self.salt)
    }

    pub fn iv_bytes(&self) -> Result<[u8; IV_LEN]> {
        decode_fixed("iv", &self.iv)
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
