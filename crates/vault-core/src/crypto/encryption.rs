//! Credential encryption
//!
//! Two modes are supported:
//! - AES-256-GCM with a 16-byte nonce (default). The associated data binds a
//!   format tag and the record salt, so any bit flip in the ciphertext, tag,
//!   IV or salt fails authentication.
//! - AES-256-CBC with PKCS#7 padding, kept so records written by the older
//!   desktop release can still be read.
//!
//! Every decryption failure after decoding collapses into
//! [`VaultError::DecryptionFailed`]; a wrong PIN and a corrupted record are
//! indistinguishable to the caller.

use aes::Aes256;
use aes_gcm::{
    aead::{consts::U16, Aead, AeadInPlace, KeyInit, Payload},
    AesGcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::{DerivedKey, KeyDerivation, SecretString, BLOCK_LEN, IV_LEN, SALT_LEN, TAG_LEN};
use crate::error::{Result, VaultError};

type Aes256Gcm16 = AesGcm<Aes256, U16>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Prefix of the GCM associated data; the record salt follows it
const GCM_AAD_PREFIX: &[u8] = b"credential-vault:aes-256-gcm:v2:";

/// Block cipher mode used for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherMode {
    /// Authenticated encryption (default for new records)
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// Chained-block mode with PKCS#7 padding (legacy records)
    #[serde(rename = "aes-256-cbc")]
    Aes256Cbc,
}

impl CipherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherMode::Aes256Gcm => "aes-256-gcm",
            CipherMode::Aes256Cbc => "aes-256-cbc",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, CipherMode::Aes256Gcm)
    }
}

impl std::fmt::Display for CipherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encrypts and decrypts a single credential under a PIN-derived key
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialCipher {
    mode: CipherMode,
    kdf: KeyDerivation,
}

impl CredentialCipher {
    pub fn new(mode: CipherMode, kdf: KeyDerivation) -> Self {
        Self { mode, kdf }
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    pub fn kdf(&self) -> &KeyDerivation {
        &self.kdf
    }

    /// Encrypt `plaintext` under `key`
    ///
    /// A fresh random IV is drawn for every call. `salt` is the salt the key
    /// was derived with; GCM binds it as associated data, CBC ignores it.
    ///
    /// # Returns
    /// `(iv, ciphertext)`
    pub fn encrypt(
        &self,
        plaintext: &str,
        key: &DerivedKey,
        salt: &[u8; SALT_LEN],
    ) -> Result<([u8; IV_LEN], Vec<u8>)> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = match self.mode {
            CipherMode::Aes256Gcm => {
                let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
                    .map_err(|_| VaultError::Config("invalid key length".to_string()))?;
                let aad = gcm_aad(salt);
                cipher
                    .encrypt(
                        Nonce::<U16>::from_slice(&iv),
                        Payload {
                            msg: plaintext.as_bytes(),
                            aad: &aad,
                        },
                    )
                    .map_err(|_| VaultError::InvalidInput("secret is too long to encrypt".to_string()))?
            }
            CipherMode::Aes256Cbc => Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
                .map_err(|_| VaultError::Config("invalid key length".to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        };

        debug!("Encrypted credential with {}", self.mode);
        Ok((iv, ciphertext))
    }

    /// Decrypt raw record fields with an already derived key
    pub fn decrypt_with_key(
        &self,
        ciphertext: &[u8],
        key: &DerivedKey,
        salt: &[u8; SALT_LEN],
        iv: &[u8; IV_LEN],
    ) -> Result<SecretString> {
        self.check_ciphertext_len(ciphertext)?;

        // Cleared on drop, including when authentication or unpadding fails
        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        match self.mode {
            CipherMode::Aes256Gcm => {
                let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
                    .map_err(|_| VaultError::DecryptionFailed)?;
                cipher
                    .decrypt_in_place(Nonce::<U16>::from_slice(iv), &gcm_aad(salt), &mut *buffer)
                    .map_err(|_| VaultError::DecryptionFailed)?;
            }
            CipherMode::Aes256Cbc => {
                let len = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
                    .map_err(|_| VaultError::DecryptionFailed)?
                    .decrypt_padded_mut::<Pkcs7>(&mut buffer)
                    .map_err(|_| VaultError::DecryptionFailed)?
                    .len();
                buffer.truncate(len);
            }
        }

        let plaintext = std::str::from_utf8(&buffer).map_err(|_| VaultError::DecryptionFailed)?;
        Ok(SecretString::from(plaintext))
    }

    /// Decrypt base64-encoded record fields under `pin`
    ///
    /// Malformed base64 or wrong field lengths are reported as
    /// [`VaultError::MalformedRecord`] before any key is derived. Anything
    /// that goes wrong afterwards is [`VaultError::DecryptionFailed`].
    pub fn decrypt(
        &self,
        pin: &str,
        ciphertext_b64: &str,
        salt_b64: &str,
        iv_b64: &str,
    ) -> Result<SecretString> {
        let ciphertext = decode_field("ciphertext", ciphertext_b64)?;
        let salt: [u8; SALT_LEN] = decode_fixed("salt", salt_b64)?;
        let iv: [u8; IV_LEN] = decode_fixed("iv", iv_b64)?;
        self.check_ciphertext_len(&ciphertext)?;

        let key = self.kdf.derive(pin, &salt);
        self.decrypt_with_key(&ciphertext, &key, &salt, &iv)
    }

    fn check_ciphertext_len(&self, ciphertext: &[u8]) -> Result<()> {
        let well_formed = match self.mode {
            CipherMode::Aes256Gcm => ciphertext.len() >= TAG_LEN,
            CipherMode::Aes256Cbc => !ciphertext.is_empty() && ciphertext.len() % BLOCK_LEN == 0,
        };
        if well_formed {
            Ok(())
        } else {
            Err(VaultError::MalformedRecord(format!(
                "ciphertext length {} is invalid for {}",
                ciphertext.len(),
                self.mode
            )))
        }
    }
}

fn gcm_aad(salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(GCM_AAD_PREFIX.len() + SALT_LEN);
    aad.extend_from_slice(GCM_AAD_PREFIX);
    aad.extend_from_slice(salt);
    aad
}

/// Base64-encode a record field
pub(crate) fn encode_field(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Base64-decode a record field
pub(crate) fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| VaultError::MalformedRecord(format!("{} is not valid base64", name)))
}

/// Base64-decode a record field that must have exactly `N` bytes
pub(crate) fn decode_fixed<const N: usize>(name: &str, value: &str) -> Result<[u8; N]> {
    let bytes = decode_field(name, value)?;
    bytes.as_slice().try_into().map_err(|_| {
        VaultError::MalformedRecord(format!(
            "{} must be {} bytes, got {}",
            name,
            N,
            bytes.len()
        ))
    })
}
