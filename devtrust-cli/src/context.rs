//! Shared state for one CLI invocation: configuration, the device identity
//! backed by the config directory, and a pack engine over it

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devtrust_common::logging::Logger;
use devtrust_common::time::{SystemTimeSource, TimeSource};
use devtrust_keys::{DeviceIdentityManager, FileIdentityStore};
use devtrust_pack::ConfigPackEngine;

use crate::config::{CliConfig, STORE_DIR};

pub struct CliContext {
    config_dir: PathBuf,
    config: CliConfig,
    identity: Arc<DeviceIdentityManager>,
    engine: ConfigPackEngine,
    logger: Arc<Logger>,
}

impl CliContext {
    pub fn open(config_dir: PathBuf, logger: Arc<Logger>) -> Result<Self> {
        Self::open_with_clock(config_dir, Arc::new(SystemTimeSource), logger)
    }

    pub fn open_with_clock(
        config_dir: PathBuf,
        clock: Arc<dyn TimeSource>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let config = CliConfig::load_or_default(&config_dir)?;
        let store = Arc::new(FileIdentityStore::new(config_dir.join(STORE_DIR)));
        let identity = DeviceIdentityManager::open(
            store,
            config.identity.clone(),
            clock,
            logger.clone(),
        )
        .with_context(|| format!("Failed to open device identity in {config_dir:?}"))?;
        let identity = Arc::new(identity);
        let engine = ConfigPackEngine::new(identity.clone(), config.pack.clone(), logger.clone());

        Ok(Self {
            config_dir,
            config,
            identity,
            engine,
            logger,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    pub fn identity(&self) -> &DeviceIdentityManager {
        &self.identity
    }

    pub fn engine(&self) -> &ConfigPackEngine {
        &self.engine
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }
}
