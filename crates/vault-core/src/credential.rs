//! Credential updates coming from the settings form
//!
//! A secret is only ever stored together with the PIN that protects it.
//! Leaving both fields blank means "keep what is stored".

use tracing::debug;

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};
use crate::storage::EncryptedRecord;
use crate::vault::CredentialVault;

/// A secret and PIN submitted together
#[derive(Debug)]
pub struct CredentialUpdate {
    secret: SecretString,
    pin: SecretString,
}

impl CredentialUpdate {
    /// Validate a form submission
    ///
    /// Both fields are trimmed. Both blank gives `Ok(None)`; exactly one
    /// blank is [`VaultError::InvalidInput`].
    pub fn from_fields(secret: &str, pin: &str) -> Result<Option<Self>> {
        let secret = secret.trim();
        let pin = pin.trim();

        match (secret.is_empty(), pin.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Err(VaultError::InvalidInput(
                "a PIN is required to store the API key".to_string(),
            )),
            (true, false) => Err(VaultError::InvalidInput(
                "an API key is required when setting a PIN".to_string(),
            )),
            (false, false) => Ok(Some(Self {
                secret: SecretString::from(secret),
                pin: SecretString::from(pin),
            })),
        }
    }

    /// Encrypt and persist the update
    pub fn apply(self, vault: &CredentialVault) -> Result<EncryptedRecord> {
        debug!("Applying credential update");
        vault.store(self.secret.expose(), self.pin.expose())
    }
}
