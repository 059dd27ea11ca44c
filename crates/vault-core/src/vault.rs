//! The credential vault
//!
//! Owns the single encrypted record and its lifecycle. PINs, derived keys
//! and plaintext never outlive the call that used them.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::crypto::{generate_salt, CredentialCipher, KeyDerivation, SecretString};
use crate::error::{Result, VaultError};
use crate::settings::Settings;
use crate::storage::{EncryptedRecord, FileRecordStore, RecordStore};

/// Vault state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No record stored
    Empty,
    /// A record is stored
    Populated,
}

/// PIN-gated store for one secret
pub struct CredentialVault {
    /// Storage backend
    store: Box<dyn RecordStore>,
    /// Cipher and work factor for new records
    cipher: CredentialCipher,
}

impl CredentialVault {
    /// Create a vault over an explicit store and cipher
    pub fn new(store: Box<dyn RecordStore>, cipher: CredentialCipher) -> Self {
        debug!(
            "Credential vault using {} with {}",
            store.backend_name(),
            cipher.mode()
        );
        Self { store, cipher }
    }

    /// Create a file-backed vault from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let kdf = KeyDerivation::new(settings.vault.kdf_iterations)?;
        let cipher = CredentialCipher::new(settings.vault.cipher, kdf);
        if !cipher.mode().is_authenticated() {
            warn!("New credentials will use {} which cannot detect tampering", cipher.mode());
        }

        let store = FileRecordStore::new(settings.record_path()?);
        Ok(Self::new(Box::new(store), cipher))
    }

    /// Get the current vault state
    pub fn state(&self) -> VaultState {
        if self.store.exists() {
            VaultState::Populated
        } else {
            VaultState::Empty
        }
    }

    /// Check whether a credential is stored, without decrypting it
    pub fn has_credential(&self) -> bool {
        self.state() == VaultState::Populated
    }

    /// Encrypt `secret` under `pin` and persist it, replacing any previous record
    ///
    /// An empty PIN or secret is rejected and leaves the stored record as it was.
    pub fn store(&self, secret: &str, pin: &str) -> Result<EncryptedRecord> {
        if secret.is_empty() {
            return Err(VaultError::InvalidInput("secret must not be empty".to_string()));
        }
        if pin.is_empty() {
            return Err(VaultError::InvalidInput("PIN must not be empty".to_string()));
        }

        let salt = generate_salt();
        let record = {
            let key = self.cipher.kdf().derive(pin, &salt);
            let (iv, ciphertext) = self.cipher.encrypt(secret, &key, &salt)?;
            EncryptedRecord::new(&self.cipher, &ciphertext, &salt, &iv)
        };

        self.store.save(&record)?;

        info!("Stored credential ({})", record.cipher);
        Ok(record)
    }

    /// Decrypt the stored credential with `pin`
    ///
    /// The caller owns the returned secret; the vault keeps no copy.
    pub fn retrieve(&self, pin: &str) -> Result<SecretString> {
        let record = self.store.load()?.ok_or(VaultError::NoCredential)?;

        match record.open(pin) {
            Ok(secret) => {
                debug!("Credential decrypted");
                Ok(secret)
            }
            Err(e) => {
                debug!("Credential retrieval failed: {}", e);
                Err(e)
            }
        }
    }

    /// Run `f` with the decrypted secret, dropping the plaintext as soon as it returns
    pub fn with_secret<F, R>(&self, pin: &str, f: F) -> Result<R>
    where
        F: FnOnce(&str) -> R,
    {
        let secret = self.retrieve(pin)?;
        Ok(f(secret.expose()))
    }

    /// Get the stored record's metadata without decrypting it
    pub fn record(&self) -> Result<Option<EncryptedRecord>> {
        self.store.load()
    }

    /// Remove the stored credential, returning whether one existed
    pub fn delete(&self) -> Result<bool> {
        let existed = self.store.delete()?;
        if existed {
            info!("Deleted stored credential");
        }
        Ok(existed)
    }

    /// Install a record from a legacy keys file, replacing any previous record
    ///
    /// The record is not decrypted; a wrong or corrupt import shows up on the
    /// next [`CredentialVault::retrieve`].
    pub fn import_legacy(&self, path: &Path) -> Result<EncryptedRecord> {
        let contents = std::fs::read_to_string(path)?;
        let record = EncryptedRecord::from_legacy_keys(&contents)?;

        // Catch bad encodings now rather than on the next retrieve
        record.salt_bytes()?;
        record.iv_bytes()?;
        record.ciphertext_bytes()?;

        self.store.save(&record)?;

        info!("Imported legacy credential from {:?}", path);
        Ok(record)
    }

    /// Cipher used for new records
    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherMode, IV_LEN};
    use aes::Aes256;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
    use tempfile::TempDir;

    fn test_vault() -> (CredentialVault, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(
            Box::new(FileRecordStore::in_dir(temp_dir.path())),
            CredentialCipher::default(),
        );
        (vault, temp_dir)
    }

    #[test]
    fn test_store_and_retrieve() {
        let (vault, _dir) = test_vault();

        vault.store("sk-proj-abc123xyz789", "1234").unwrap();

        let secret = vault.retrieve("1234").unwrap();
        assert_eq!(secret.expose(), "sk-proj-abc123xyz789");
    }

    #[test]
    fn test_roundtrip_unicode_and_long_secrets() {
        let (vault, _dir) = test_vault();
        let long = "x".repeat(4096);

        for (secret, pin) in [("日本語のキー", "ピン"), (long.as_str(), "9"), (" padded ", "  ")] {
            vault.store(secret, pin).unwrap();
            assert_eq!(vault.retrieve(pin).unwrap().expose(), secret);
        }
    }

    #[test]
    fn test_scenario_right_then_wrong_pin() {
        let (vault, _dir) = test_vault();
        assert_eq!(vault.state(), VaultState::Empty);

        vault.store("sk-ABC123", "1234").unwrap();
        assert!(vault.has_credential());

        assert_eq!(vault.retrieve("1234").unwrap().expose(), "sk-ABC123");
        assert!(vault.has_credential());

        assert!(matches!(vault.retrieve("0000"), Err(VaultError::DecryptionFailed)));
        assert!(vault.has_credential());

        // A failed attempt does not lock anything out
        assert_eq!(vault.retrieve("1234").unwrap().expose(), "sk-ABC123");
    }

    #[test]
    fn test_retrieve_from_empty_vault() {
        let (vault, _dir) = test_vault();

        assert!(!vault.has_credential());
        assert!(matches!(vault.retrieve("anything"), Err(VaultError::NoCredential)));
    }

    #[test]
    fn test_fresh_salt_and_iv_per_store() {
        let (vault, _dir) = test_vault();

        let first = vault.store("sk-ABC123", "1234").unwrap();
        let second = vault.store("sk-ABC123", "1234").unwrap();

        assert_ne!(first.salt, second.salt);
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);
        assert_eq!(vault.record().unwrap(), Some(second));
    }

    #[test]
    fn test_tampered_record_fails() {
        let (vault, dir) = test_vault();
        let record = vault.store("sk-ABC123", "1234").unwrap();
        let ciphertext = record.ciphertext_bytes().unwrap();
        let store = FileRecordStore::in_dir(dir.path());

        for bit in [0, 7, 8 * ciphertext.len() / 2, 8 * ciphertext.len() - 1] {
            let mut tampered = ciphertext.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            let mut forged = record.clone();
            forged.ciphertext = STANDARD.encode(&tampered);
            store.save(&forged).unwrap();

            assert!(matches!(vault.retrieve("1234"), Err(VaultError::DecryptionFailed)), "bit {}", bit);
        }
    }

    #[test]
    fn test_empty_input_rejected_without_writing() {
        let (vault, _dir) = test_vault();

        assert!(matches!(vault.store("", "1234"), Err(VaultError::InvalidInput(_))));
        assert!(matches!(vault.store("sk-ABC123", ""), Err(VaultError::InvalidInput(_))));
        assert_eq!(vault.state(), VaultState::Empty);

        let stored = vault.store("sk-ABC123", "1234").unwrap();
        assert!(vault.store("", "1234").is_err());
        assert!(vault.store("sk-OTHER", "").is_err());
        assert_eq!(vault.record().unwrap(), Some(stored));
    }

    #[test]
    fn test_store_replaces_previous_secret() {
        let (vault, _dir) = test_vault();

        vault.store("sk-OLD", "1111").unwrap();
        vault.store("sk-NEW", "2222").unwrap();

        assert!(matches!(vault.retrieve("1111"), Err(VaultError::DecryptionFailed)));
        assert_eq!(vault.retrieve("2222").unwrap().expose(), "sk-NEW");
    }

    #[test]
    fn test_delete() {
        let (vault, _dir) = test_vault();

        assert!(!vault.delete().unwrap());
        vault.store("sk-ABC123", "1234").unwrap();
        assert!(vault.delete().unwrap());

        assert_eq!(vault.state(), VaultState::Empty);
        assert!(matches!(vault.retrieve("1234"), Err(VaultError::NoCredential)));
    }

    #[test]
    fn test_with_secret() {
        let (vault, _dir) = test_vault();
        vault.store("sk-ABC123", "1234").unwrap();

        let header = vault
            .with_secret("1234", |key| format!("Bearer {}", key))
            .unwrap();
        assert_eq!(header, "Bearer sk-ABC123");

        let result = vault.with_secret("0000", |key| key.len());
        assert!(matches!(result, Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn test_malformed_stored_field() {
        let (vault, dir) = test_vault();
        let mut record = vault.store("sk-ABC123", "1234").unwrap();
        record.salt = "not*base64".to_string();
        FileRecordStore::in_dir(dir.path()).save(&record).unwrap();

        assert!(matches!(vault.retrieve("1234"), Err(VaultError::MalformedRecord(_))));
    }

    #[test]
    fn test_inflated_work_factor_fails_fast() {
        let (vault, dir) = test_vault();
        let mut record = vault.store("sk-ABC123", "1234").unwrap();
        record.kdf_iterations = 30_000_000;
        FileRecordStore::in_dir(dir.path()).save(&record).unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(vault.retrieve("1234"), Err(VaultError::MalformedRecord(_))));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_cbc_vault_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let vault = CredentialVault::new(
            Box::new(FileRecordStore::in_dir(temp_dir.path())),
            CredentialCipher::new(CipherMode::Aes256Cbc, KeyDerivation::default()),
        );

        let record = vault.store("sk-ABC123", "1234").unwrap();
        assert_eq!(record.cipher, CipherMode::Aes256Cbc);
        assert_eq!(vault.retrieve("1234").unwrap().expose(), "sk-ABC123");
    }

    #[test]
    fn test_import_legacy_keys_file() {
        let (vault, dir) = test_vault();

        // Seal the way the older desktop release did: PBKDF2 + AES-CBC + PKCS#7
        let salt = generate_salt();
        let iv = [0x42u8; IV_LEN];
        let key = KeyDerivation::default().derive("1234", &salt);
        let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(key.as_bytes(), &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(b"sk-LEGACY");

        let keys_path = dir.path().join("keys.py");
        std::fs::write(
            &keys_path,
            format!(
                "ENCRYPTED_API_KEY = \"{}\"\nSALT = \"{}\"\nIV = \"{}\"\n",
                STANDARD.encode(&ciphertext),
                STANDARD.encode(salt),
                STANDARD.encode(iv)
            ),
        )
        .unwrap();

        let record = vault.import_legacy(&keys_path).unwrap();
        assert_eq!(record.cipher, CipherMode::Aes256Cbc);
        assert!(vault.has_credential());
        assert_eq!(vault.retrieve("1234").unwrap().expose(), "sk-LEGACY");
        assert!(matches!(vault.retrieve("4321"), Err(VaultError::DecryptionFailed)));

        // Re-storing upgrades the record to the authenticated format
        let upgraded = vault.store("sk-LEGACY", "1234").unwrap();
        assert_eq!(upgraded.cipher, CipherMode::Aes256Gcm);
    }

    #[test]
    fn test_import_rejects_bad_encoding() {
        let (vault, dir) = test_vault();
        let keys_path = dir.path().join("keys.py");
        std::fs::write(
            &keys_path,
            "ENCRYPTED_API_KEY = \"abc\"\nSALT = \"AAECAwQFBgcICQoLDA0ODw==\"\nIV = \"AAEC\"\n",
        )
        .unwrap();

        assert!(matches!(vault.import_legacy(&keys_path), Err(VaultError::MalformedRecord(_))));
        assert_eq!(vault.state(), VaultState::Empty);
    }

    #[test]
    fn test_from_settings() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::default().with_data_dir(temp_dir.path());

        let vault = CredentialVault::from_settings(&settings).unwrap();
        vault.store("sk-ABC123", "1234").unwrap();

        assert!(settings.record_path().unwrap().is_file());
        assert_eq!(vault.cipher().kdf().iterations(), settings.vault.kdf_iterations);
    }
}
