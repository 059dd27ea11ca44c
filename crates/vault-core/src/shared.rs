//! Shared vault handle for async hosts
//!
//! Every operation holds the vault lock for its whole duration, so a store
//! never interleaves with a retrieve of the same record. Key stretching runs
//! on the blocking pool rather than on a runtime worker.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::credential::CredentialUpdate;
use crate::crypto::SecretString;
use crate::error::{Result, VaultError};
use crate::storage::EncryptedRecord;
use crate::vault::{CredentialVault, VaultState};

/// Thread-safe vault handle. Clone to share across tasks.
#[derive(Clone)]
pub struct SharedVault {
    inner: Arc<Mutex<CredentialVault>>,
}

impl SharedVault {
    pub fn new(vault: CredentialVault) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vault)),
        }
    }

    /// Run `f` against the vault on the blocking pool while holding the lock
    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&CredentialVault) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.inner.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&*guard))
            .await
            .map_err(|e| VaultError::TaskFailed(e.to_string()))?
    }

    pub async fn store(&self, secret: SecretString, pin: SecretString) -> Result<EncryptedRecord> {
        self.run(move |vault| vault.store(secret.expose(), pin.expose()))
            .await
    }

    /// Apply a validated settings-form update
    pub async fn apply(&self, update: CredentialUpdate) -> Result<EncryptedRecord> {
        self.run(move |vault| update.apply(vault)).await
    }

    pub async fn retrieve(&self, pin: SecretString) -> Result<SecretString> {
        self.run(move |vault| vault.retrieve(pin.expose())).await
    }

    pub async fn with_secret<F, R>(&self, pin: SecretString, f: F) -> Result<R>
    where
        F: FnOnce(&str) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run(move |vault| vault.with_secret(pin.expose(), f))
            .await
    }

    pub async fn has_credential(&self) -> bool {
        self.inner.lock().await.has_credential()
    }

    pub async fn state(&self) -> VaultState {
        self.inner.lock().await.state()
    }

    pub async fn record(&self) -> Result<Option<EncryptedRecord>> {
        self.run(|vault| vault.record()).await
    }

    pub async fn delete(&self) -> Result<bool> {
        self.run(|vault| vault.delete()).await
    }

    pub async fn import_legacy(&self, path: std::path::PathBuf) -> Result<EncryptedRecord> {
        self.run(move |vault| vault.import_legacy(&path)).await
    }
}
