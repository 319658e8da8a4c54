//! Configuration file handling.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json` and names
//! the blob store location the pipeline reads and writes. The store
//! directory may be relative, in which case it resolves against the home
//! directory.

use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "ledger";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const DEFAULT_STORE_DIR: &str = "store";

/// The `Config` object represents the configuration of the app. You
/// instantiate it by providing the path to `$LEDGER_HOME` and from there it
/// loads `$LEDGER_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory and an initial `config.json`.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be `$LEDGER_HOME`, e.g. `$HOME/ledger`
    /// - `store_dir` - Where the blob store lives. Relative paths resolve
    ///   against `$LEDGER_HOME`; `None` uses the default `store` subdirectory.
    ///
    /// # Errors
    /// - Returns an error if the config file already exists or any file
    ///   operation fails.
    pub async fn create(dir: impl Into<PathBuf>, store_dir: Option<PathBuf>) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the ledger home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.is_file() {
            bail!(
                "A config file already exists at '{}'",
                config_path.display()
            );
        }

        let config_file = ConfigFile {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            store_dir: store_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
        };
        config_file.save(&config_path).await?;

        let config = Self {
            root,
            config_path,
            config_file,
        };
        utils::make_dir(&config.store_root()).await?;
        Ok(config)
    }

    /// Validates that `$LEDGER_HOME` and the config file exist, loads the
    /// config file, and returns the loaded configuration object.
    pub async fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = ledger_home.into();
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!(
                "The config file is missing '{}', run 'ledger init' first",
                config_path.display()
            )
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let config = Self {
            root,
            config_path,
            config_file,
        };
        if !config.store_root().is_dir() {
            bail!(
                "The store directory is missing '{}'",
                config.store_root().display()
            )
        }
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the stored `store_dir` if it is absolute, otherwise resolves
    /// it against the home directory.
    pub fn store_root(&self) -> PathBuf {
        let p = &self.config_file.store_dir;
        if p.is_absolute() {
            p.clone()
        } else {
            self.root.join(p)
        }
    }
}

/// Represents the serialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "ledger",
///   "config_version": 1,
///   "store_dir": "store"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "ledger"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Path to the blob store directory (relative to the home dir, or absolute)
    store_dir: PathBuf,
}

impl ConfigFile {
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}
