//! `devtrust pack` commands: create, inspect and import `.tscfg` packs

use anyhow::{Context, Result};
use clap::Subcommand;
use std::fmt::Write as _;
use std::path::PathBuf;

use devtrust_pack::{CreateOptions, SignatureInfo};

use crate::context::CliContext;

#[derive(Subcommand, Debug, Clone)]
pub enum PackCommand {
    /// Show export capability and the device fingerprint
    Status,
    /// Encrypt a file for a recipient certificate
    Create {
        #[arg(long)]
        name: String,
        /// Plaintext configuration file
        #[arg(long)]
        input: PathBuf,
        /// Recipient device certificate (PEM)
        #[arg(long)]
        recipient: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// Write the pack here instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a pack's signature without decrypting it
    Verify { file: PathBuf },
    /// Decrypt a pack addressed to this device
    Load { file: PathBuf },
    /// Verify a pack and store it in the pack directory
    Import { file: PathBuf },
    /// List imported packs
    List,
    /// Print the decrypted content of an imported pack
    Show { name: String },
}

impl PackCommand {
    pub fn run(&self, ctx: &CliContext) -> Result<String> {
        let engine = ctx.engine();
        match self {
            PackCommand::Status => {
                let status = engine.status();
                let mut text = String::new();
                writeln!(text, "Device type: {}", status.device_type)?;
                writeln!(text, "Can export:  {}", status.can_export)?;
                writeln!(
                    text,
                    "Fingerprint: {}",
                    status.cert_fingerprint.as_deref().unwrap_or("-")
                )?;
                writeln!(text, "Pack format: {}", status.pack_version)?;
                write!(text, "Algorithm:   {}", status.algorithm)?;
                Ok(text)
            }
            PackCommand::Create {
                name,
                input,
                recipient,
                description,
                out,
            } => {
                let content = std::fs::read(input)
                    .with_context(|| format!("Failed to read input: {input:?}"))?;
                let recipient_pem = std::fs::read_to_string(recipient)
                    .with_context(|| format!("Failed to read recipient certificate: {recipient:?}"))?;
                let options = CreateOptions {
                    description: description.clone(),
                };
                let json = engine.create(name, &content, &recipient_pem, &options)?;
                match out {
                    Some(path) => {
                        engine.save(path, &json)?;
                        Ok(format!("Pack '{name}' written to {}", path.display()))
                    }
                    None => Ok(json),
                }
            }
            PackCommand::Verify { file } => {
                let sig_info = engine.verify_file(file)?;
                Ok(describe_signature(&sig_info))
            }
            PackCommand::Load { file } => {
                let pack = engine.load_file(file)?;
                Ok(String::from_utf8_lossy(&pack.content).into_owned())
            }
            PackCommand::Import { file } => {
                let json = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read pack: {file:?}"))?;
                let imported = engine.import(&json)?;
                Ok(format!(
                    "Imported '{}' to {}\n{}",
                    imported.metadata.name,
                    imported.saved_path.display(),
                    describe_signature(&imported.sig_info)
                ))
            }
            PackCommand::List => Ok(engine.list()?.join("\n")),
            PackCommand::Show { name } => {
                let content = engine.get_content(name)?;
                Ok(String::from_utf8_lossy(&content).into_owned())
            }
        }
    }
}

fn describe_signature(sig_info: &SignatureInfo) -> String {
    format!(
        "Signature valid, signer {} (OU={}){}",
        sig_info.signer_cn,
        sig_info.signer_ou,
        if sig_info.is_official { ", official" } else { "" }
    )
}
