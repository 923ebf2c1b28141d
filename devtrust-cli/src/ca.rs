//! `devtrust ca` commands: a lab CA for bench provisioning
//!
//! The CA lives in a directory as `ca.crt` and `ca.key`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devtrust_common::logging::Logger;
use devtrust_keys::CertificateAuthority;

use crate::output::write_output;

pub const CA_CERT_FILE: &str = "ca.crt";
pub const CA_KEY_FILE: &str = "ca.key";

#[derive(Subcommand, Debug, Clone)]
pub enum CaCommand {
    /// Create a self-signed lab CA
    Init {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value = "DevTrust Lab CA")]
        cn: String,
    },
    /// Issue a device certificate for a CSR
    Sign {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        csr: PathBuf,
        #[arg(long, default_value_t = 365)]
        days: u32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl CaCommand {
    pub fn run(&self, logger: Arc<Logger>) -> Result<String> {
        match self {
            CaCommand::Init { dir, cn } => {
                let cert_path = dir.join(CA_CERT_FILE);
                if cert_path.exists() {
                    bail!("A CA already exists in {dir:?}");
                }
                let ca = CertificateAuthority::new(cn, logger)?;
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create CA directory: {dir:?}"))?;
                write_private(&dir.join(CA_KEY_FILE), ca.private_key_pem()?.as_bytes())?;
                fs::write(&cert_path, ca.ca_certificate_pem()?)
                    .with_context(|| format!("Failed to write {cert_path:?}"))?;
                Ok(format!("Created CA '{cn}' in {}", dir.display()))
            }
            CaCommand::Sign {
                dir,
                csr,
                days,
                out,
            } => {
                let ca = load_ca(dir, logger)?;
                let csr_pem = fs::read_to_string(csr)
                    .with_context(|| format!("Failed to read CSR: {csr:?}"))?;
                let cert_pem = ca.sign_csr_pem(&csr_pem, *days)?;
                write_output(out.as_deref(), &cert_pem, "Certificate")
            }
        }
    }
}

pub fn load_ca(dir: &Path, logger: Arc<Logger>) -> Result<CertificateAuthority> {
    let cert_pem = fs::read_to_string(dir.join(CA_CERT_FILE))
        .with_context(|| format!("No CA certificate in {dir:?}"))?;
    let key_pem = fs::read_to_string(dir.join(CA_KEY_FILE))
        .with_context(|| format!("No CA key in {dir:?}"))?;
    Ok(CertificateAuthority::from_pem(&cert_pem, &key_pem, logger)?)
}

fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create {path:?}"))?;
    file.write_all(content)
        .with_context(|| format!("Failed to write {path:?}"))?;
    Ok(())
}
