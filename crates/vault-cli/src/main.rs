//! Credential vault CLI
//!
//! Loads the settings once, builds the vault from them and runs a single
//! command. PINs and API keys are prompted for without echo unless passed
//! through the environment.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

use vault_core::settings::default_settings_path;
use vault_core::{
    CipherMode, CredentialUpdate, CredentialVault, SecretString, Settings, SharedVault, VaultError,
};

/// PIN-gated storage for the translation API key
#[derive(Parser, Debug)]
#[command(name = "credential-vault")]
#[command(version)]
#[command(about = "PIN-gated storage for the translation API key")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "CREDENTIAL_VAULT_CONFIG")]
    config: Option<PathBuf>,

    /// PIN for commands that need one; prompted for when absent
    #[arg(long, global = true, env = "CREDENTIAL_VAULT_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether a credential is stored, without decrypting it
    Status,
    /// Encrypt and store an API key under a PIN
    Set {
        /// API key; prompted for when absent
        #[arg(long, env = "CREDENTIAL_VAULT_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
    /// Check that a PIN opens the stored credential
    Check,
    /// Print the decrypted API key
    Show,
    /// Delete the stored credential
    Delete {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Import a keys file written by the older desktop release
    ImportLegacy {
        /// Path of the keys file
        path: PathBuf,
    },
    /// Show the effective settings, or save changed ones
    Config {
        /// Work factor for newly stored credentials
        #[arg(long)]
        kdf_iterations: Option<u32>,
        /// Cipher for newly stored credentials
        #[arg(long, value_enum)]
        cipher: Option<CipherArg>,
        /// Directory holding the record file
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CipherArg {
    Gcm,
    Cbc,
}

impl From<CipherArg> for CipherMode {
    fn from(arg: CipherArg) -> Self {
        match arg {
            CipherArg::Gcm => CipherMode::Aes256Gcm,
            CipherArg::Cbc => CipherMode::Aes256Cbc,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let settings_path = match args.config.clone() {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    run(args.command, args.pin, &settings, &settings_path).await
}

/// Run one command; the vault is only opened by commands that use it
async fn run(
    command: Command,
    pin: Option<String>,
    settings: &Settings,
    settings_path: &Path,
) -> anyhow::Result<()> {
    match command {
        Command::Status => {
            let vault = open_vault(settings)?;
            match vault.record().await? {
                Some(record) => {
                    println!("Credential: stored");
                    println!("Cipher:     {}", record.cipher);
                    println!("Work factor: {} iterations", record.kdf_iterations);
                    if let Some(stored_at) = record.stored_at {
                        println!("Stored at:  {}", stored_at.to_rfc3339());
                    }
                }
                None => println!("Credential: none"),
            }
            println!("Record file: {}", settings.record_path()?.display());
        }
        Command::Set { secret } => {
            let secret = SecretString::new(match secret {
                Some(secret) => secret,
                None => rpassword::prompt_password("API key: ")?,
            });
            let pin = SecretString::new(match pin {
                Some(pin) => pin,
                None => {
                    let pin = rpassword::prompt_password("PIN: ")?;
                    if pin != rpassword::prompt_password("Confirm PIN: ")? {
                        bail!("PINs do not match");
                    }
                    pin
                }
            });

            let Some(update) = CredentialUpdate::from_fields(secret.expose(), pin.expose())? else {
                bail!("Nothing to store - enter both an API key and a PIN");
            };
            open_vault(settings)?.apply(update).await?;
            println!("Credential stored");
        }
        Command::Check => {
            let pin = read_pin(pin)?;
            open_vault(settings)?
                .with_secret(pin, |_| ())
                .await
                .map_err(describe)?;
            println!("PIN accepted");
        }
        Command::Show => {
            let pin = read_pin(pin)?;
            open_vault(settings)?
                .with_secret(pin, |secret| println!("{}", secret))
                .await
                .map_err(describe)?;
        }
        Command::Delete { yes } => {
            if !yes {
                bail!("Refusing to delete without --yes");
            }
            if open_vault(settings)?.delete().await? {
                println!("Credential deleted");
            } else {
                println!("No credential stored");
            }
        }
        Command::ImportLegacy { path } => {
            let record = open_vault(settings)?
                .import_legacy(path.clone())
                .await
                .with_context(|| format!("Failed to import {}", path.display()))?;
            info!("Imported {} record", record.cipher);
            println!("Imported credential from {}", path.display());
        }
        Command::Config {
            kdf_iterations,
            cipher,
            data_dir,
        } => configure(settings, settings_path, kdf_iterations, cipher, data_dir)?,
    }

    Ok(())
}

fn open_vault(settings: &Settings) -> anyhow::Result<SharedVault> {
    let vault = CredentialVault::from_settings(settings).context("Failed to open credential vault")?;
    Ok(SharedVault::new(vault))
}

/// Build and save new settings; the loaded value is never mutated
fn configure(
    settings: &Settings,
    path: &Path,
    kdf_iterations: Option<u32>,
    cipher: Option<CipherArg>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut next = settings.clone();
    if let Some(iterations) = kdf_iterations {
        next = next.with_kdf_iterations(iterations)?;
    }
    if let Some(cipher) = cipher {
        next = next.with_cipher(cipher.into());
    }
    if let Some(dir) = data_dir {
        next = next.with_data_dir(dir);
    }

    if next != *settings {
        next.save(path)
            .with_context(|| format!("Failed to save settings to {}", path.display()))?;
        info!("Saved settings to {}", path.display());
    }

    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}

fn read_pin(pin: Option<String>) -> anyhow::Result<SecretString> {
    let pin = match pin {
        Some(pin) => pin,
        None => rpassword::prompt_password("PIN: ")?,
    };
    Ok(SecretString::new(pin))
}

/// Turn the vault's failure taxonomy into messages for a person at a terminal
fn describe(error: VaultError) -> anyhow::Error {
    match error {
        VaultError::NoCredential => anyhow::anyhow!("No credential stored - run `credential-vault set` first"),
        VaultError::DecryptionFailed => anyhow::anyhow!("Wrong PIN, or the stored credential is corrupted"),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    fn temp_settings() -> (Settings, PathBuf, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::default().with_data_dir(temp_dir.path().join("data"));
        let path = temp_dir.path().join("settings.json");
        (settings, path, temp_dir)
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_global_pin_after_subcommand() {
        let args = Args::try_parse_from(["credential-vault", "check", "--pin", "1234"]).unwrap();
        assert_eq!(args.pin.as_deref(), Some("1234"));
        assert!(matches!(args.command, Command::Check));
    }

    #[test]
    fn test_parse_config_changes() {
        let args = Args::try_parse_from([
            "credential-vault",
            "config",
            "--kdf-iterations",
            "200000",
            "--cipher",
            "cbc",
        ])
        .unwrap();

        match args.command {
            Command::Config {
                kdf_iterations,
                cipher,
                data_dir,
            } => {
                assert_eq!(kdf_iterations, Some(200_000));
                assert_eq!(cipher.map(CipherMode::from), Some(CipherMode::Aes256Cbc));
                assert!(data_dir.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_delete_defaults_to_unconfirmed() {
        let args = Args::try_parse_from(["credential-vault", "delete"]).unwrap();
        assert!(matches!(args.command, Command::Delete { yes: false }));
    }

    #[tokio::test]
    async fn test_config_runs_without_opening_vault() {
        let (settings, path, dir) = temp_settings();
        let command = Command::Config {
            kdf_iterations: Some(200_000),
            cipher: Some(CipherArg::Cbc),
            data_dir: None,
        };

        run(command, None, &settings, &path).await.unwrap();

        let saved = Settings::load(&path).unwrap();
        assert_eq!(saved.vault.kdf_iterations, 200_000);
        assert_eq!(saved.vault.cipher, CipherMode::Aes256Cbc);
        assert!(!dir.path().join("data").exists());
    }

    #[tokio::test]
    async fn test_config_rejects_bad_work_factor() {
        let (settings, path, _dir) = temp_settings();
        let command = Command::Config {
            kdf_iterations: Some(10),
            cipher: None,
            data_dir: None,
        };

        assert!(run(command, None, &settings, &path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_set_check_delete() {
        let (settings, path, _dir) = temp_settings();
        let pin = || Some("1234".to_string());

        let set = Command::Set {
            secret: Some("sk-ABC123".to_string()),
        };
        run(set, pin(), &settings, &path).await.unwrap();
        assert!(settings.record_path().unwrap().is_file());

        run(Command::Check, pin(), &settings, &path).await.unwrap();
        let wrong = run(Command::Check, Some("0000".to_string()), &settings, &path).await;
        assert!(wrong.unwrap_err().to_string().contains("Wrong PIN"));

        run(Command::Delete { yes: true }, None, &settings, &path).await.unwrap();
        assert!(!settings.record_path().unwrap().exists());
        assert!(run(Command::Delete { yes: false }, None, &settings, &path).await.is_err());
    }

    #[test]
    fn test_describe_hides_detail() {
        let message = describe(VaultError::DecryptionFailed).to_string();
        assert!(message.contains("Wrong PIN"));
    }
}
