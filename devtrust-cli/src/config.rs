//! Configuration management for the DevTrust CLI
//!
//! `config.json` in the config directory holds the device id used for CSRs
//! plus the identity and pack engine settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};
use std::path::{Path, PathBuf};

use devtrust_keys::IdentityConfig;
use devtrust_pack::PackConfig;

pub const CONFIG_FILE: &str = "config.json";
/// Identity store directory inside the config directory
pub const STORE_DIR: &str = "store";
pub const PACK_DIR: &str = "packs";
pub const DEFAULT_DEVICE_ID: &str = "devtrust-device";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Common name requested by `pki csr`
    pub device_id: String,
    pub identity: IdentityConfig,
    pub pack: PackConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            identity: IdentityConfig::default(),
            pack: PackConfig::default(),
        }
    }
}

impl CliConfig {
    /// Defaults with every path placed inside `config_dir`
    pub fn for_config_dir(config_dir: &Path) -> Self {
        let mut config = Self::default();
        config.identity.ca_chain_export_path = Some(config_dir.join("pki").join("ca-chain.crt"));
        config.pack.pack_dir = config_dir.join(PACK_DIR);
        config
    }

    pub fn config_file(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE)
    }

    /// Load configuration from file
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = Self::config_file(config_dir);

        if !config_file.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file not found: {:?}",
                config_file
            ));
        }

        let config_content = std::fs::read_to_string(&config_file)
            .with_context(|| format!("Failed to read config file: {config_file:?}"))?;

        let config: CliConfig = from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {config_file:?}"))?;

        Ok(config)
    }

    /// The saved configuration, or directory-local defaults when none exists
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        if Self::exists(config_dir) {
            Self::load(config_dir)
        } else {
            Ok(Self::for_config_dir(config_dir))
        }
    }

    /// Save configuration to file
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_file = Self::config_file(config_dir);

        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory: {config_dir:?}"))?;

        let config_content = to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_file, config_content)
            .with_context(|| format!("Failed to write config file: {config_file:?}"))?;

        Ok(())
    }

    /// Check if configuration exists
    pub fn exists(config_dir: &Path) -> bool {
        Self::config_file(config_dir).exists()
    }
}
