//! Vault configuration
//!
//! Settings are a plain JSON document loaded once at startup and handed to
//! components by reference. Nothing in the library mutates them; a change
//! produces a new [`Settings`] value that the owner decides to save.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crypto::{CipherMode, DEFAULT_ITERATIONS, MAX_ITERATIONS, MIN_ITERATIONS};
use crate::error::{Result, VaultError};
use crate::storage::{temp_sibling, DEFAULT_RECORD_FILE};

/// Current settings file version
pub const SETTINGS_VERSION: u32 = 1;

/// Default settings file name inside the config directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Key derivation and record settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultSettings {
    /// PBKDF2 work factor for newly stored credentials
    pub kdf_iterations: u32,
    /// Cipher for newly stored credentials
    pub cipher: CipherMode,
    /// Record file name inside the data directory
    pub record_file: String,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_ITERATIONS,
            cipher: CipherMode::default(),
            record_file: DEFAULT_RECORD_FILE.to_string(),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Directory holding the record (platform data dir when unset)
    pub data_dir: Option<PathBuf>,
    /// Vault configuration
    pub vault: VaultSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            data_dir: None,
            vault: VaultSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| VaultError::Config(format!("invalid settings file {:?}: {}", path, e)))?;
        settings.validate()?;

        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;

        // Write atomically using temp file
        let temp_path = temp_sibling(path);
        std::fs::write(&temp_path, &contents)?;
        std::fs::rename(&temp_path, path)?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Check values a hand-edited file could get wrong
    pub fn validate(&self) -> Result<()> {
        if self.version > SETTINGS_VERSION {
            return Err(VaultError::Config(format!(
                "unsupported settings version {}",
                self.version
            )));
        }
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.vault.kdf_iterations) {
            return Err(VaultError::Config(format!(
                "kdfIterations must be between {} and {}, got {}",
                MIN_ITERATIONS, MAX_ITERATIONS, self.vault.kdf_iterations
            )));
        }

        let file = Path::new(&self.vault.record_file);
        if self.vault.record_file.is_empty() || file.file_name() != Some(file.as_os_str()) {
            return Err(VaultError::Config(format!(
                "recordFile must be a plain file name, got {:?}",
                self.vault.record_file
            )));
        }
        Ok(())
    }

    /// Copy with a different work factor for new credentials
    pub fn with_kdf_iterations(&self, iterations: u32) -> Result<Self> {
        let mut next = self.clone();
        next.vault.kdf_iterations = iterations;
        next.validate()?;
        Ok(next)
    }

    /// Copy with a different cipher for new credentials
    pub fn with_cipher(&self, cipher: CipherMode) -> Self {
        let mut next = self.clone();
        next.vault.cipher = cipher;
        next
    }

    /// Copy with an explicit data directory
    pub fn with_data_dir(&self, dir: impl Into<PathBuf>) -> Self {
        let mut next = self.clone();
        next.data_dir = Some(dir.into());
        next
    }

    /// Resolve the data directory
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => project_dirs().map(|dirs| dirs.data_dir().to_path_buf()),
        }
    }

    /// Full path of the record file
    pub fn record_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.vault.record_file))
    }
}

/// Default location of the settings file
pub fn default_settings_path() -> Result<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "deck-generator", "credential-vault")
        .ok_or_else(|| VaultError::Config("Could not determine data directory".to_string()))
}
