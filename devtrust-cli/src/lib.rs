//! DevTrust CLI Library
//!
//! Command implementations for the `devtrust` binary: device PKI
//! provisioning, encrypted configuration packs and a bench lab CA.

pub mod ca;
pub mod config;
pub mod context;
pub mod output;
pub mod pack;
pub mod pki;

pub use ca::CaCommand;
pub use config::CliConfig;
pub use context::CliContext;
pub use pack::PackCommand;
pub use pki::PkiCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `~/.devtrust`
pub fn default_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".devtrust"))
}
