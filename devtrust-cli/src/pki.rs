//! `devtrust pki` commands: device key pair, CSR and certificate lifecycle

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use devtrust_common::log_info;
use devtrust_keys::{CertInfo, CsrOptions};

use crate::context::CliContext;
use crate::output::write_output;

#[derive(Subcommand, Debug, Clone)]
pub enum PkiCommand {
    /// Show the identity status
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate the device key pair
    Generate {
        /// Replace an existing key pair (invalidates the installed certificate)
        #[arg(short, long)]
        force: bool,
    },
    /// Create a certificate signing request
    Csr {
        /// Common name (default: device_id from config.json)
        #[arg(long)]
        device_id: Option<String>,
        /// IPv4 subject alternative name (repeatable)
        #[arg(long = "ip")]
        ips: Vec<Ipv4Addr>,
        /// DNS subject alternative name (repeatable)
        #[arg(long = "dns")]
        dns_names: Vec<String>,
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        ou: Option<String>,
        /// Write the CSR here instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Install a CA-issued device certificate
    Install {
        #[arg(long)]
        file: PathBuf,
    },
    /// Install the CA chain
    InstallCa {
        #[arg(long)]
        file: PathBuf,
    },
    /// Show certificate details
    Info,
    /// Export the device certificate
    ExportCert {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Erase key, certificate and CA chain
    Reset {
        #[arg(long)]
        force: bool,
    },
}

impl PkiCommand {
    pub fn run(&self, ctx: &CliContext) -> Result<String> {
        let identity = ctx.identity();
        match self {
            PkiCommand::Status { json } => {
                let report = identity.get_status()?;
                if *json {
                    return serde_json::to_string_pretty(&report)
                        .context("Failed to serialize status");
                }
                let mut text = String::new();
                writeln!(text, "Status:      {}", report.status)?;
                if let Some(validity) = report.validity {
                    writeln!(text, "Validity:    {}", validity.as_str())?;
                }
                writeln!(text, "Private key: {}", yes_no(report.has_private_key))?;
                writeln!(text, "Certificate: {}", yes_no(report.has_certificate))?;
                write!(text, "CA chain:    {}", yes_no(report.has_ca_chain))?;
                if let Some(info) = &report.cert_info {
                    write!(text, "\n{}", describe_certificate(info)?)?;
                }
                Ok(text)
            }
            PkiCommand::Generate { force } => {
                if identity.has_keypair()? && !force {
                    return Ok(
                        "Key pair already exists. Use --force to replace it.".to_string()
                    );
                }
                identity.generate_keypair()?;
                log_info!(ctx.logger(), "Generated device key pair");
                Ok("Generated ECDSA P-256 key pair".to_string())
            }
            PkiCommand::Csr {
                device_id,
                ips,
                dns_names,
                org,
                ou,
                out,
            } => {
                let device_id = device_id
                    .clone()
                    .unwrap_or_else(|| ctx.config().device_id.clone());
                let mut options = CsrOptions::with_defaults(device_id, &ctx.config().identity);
                if let Some(org) = org {
                    options = options.organization(org.clone());
                }
                if let Some(ou) = ou {
                    options = options.org_unit(ou.clone());
                }
                for ip in ips {
                    options = options.ip_san(*ip);
                }
                for name in dns_names {
                    options = options.dns_san(name.clone());
                }

                let csr = identity.generate_csr(&options)?;
                write_output(out.as_deref(), &csr, &format!("CSR for {}", options.subject()))
            }
            PkiCommand::Install { file } => {
                let pem = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read certificate: {file:?}"))?;
                identity.install_certificate(&pem)?;
                Ok(format!(
                    "Certificate installed, status: {}",
                    identity.status()?
                ))
            }
            PkiCommand::InstallCa { file } => {
                let pem = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read CA chain: {file:?}"))?;
                identity.install_ca_chain(&pem)?;
                Ok("CA chain installed".to_string())
            }
            PkiCommand::Info => describe_certificate(&identity.get_info()?),
            PkiCommand::ExportCert { out } => {
                let pem = identity.get_certificate()?;
                write_output(out.as_deref(), &pem, "Device certificate")
            }
            PkiCommand::Reset { force } => {
                if !force {
                    bail!("Refusing to erase the device identity without --force");
                }
                identity.factory_reset()?;
                Ok("Device identity erased".to_string())
            }
        }
    }
}

fn describe_certificate(info: &CertInfo) -> Result<String> {
    let mut text = String::new();
    writeln!(text, "Subject CN:  {}", info.subject_cn)?;
    writeln!(text, "Subject OU:  {}", info.subject_ou)?;
    writeln!(text, "Issuer CN:   {}", info.issuer_cn)?;
    writeln!(text, "Serial:      {}", info.serial)?;
    writeln!(text, "Not before:  {}", devtrust_common::time::format_iso8601(info.not_before))?;
    writeln!(text, "Not after:   {}", devtrust_common::time::format_iso8601(info.not_after))?;
    if info.days_until_expiry == i32::MAX {
        write!(text, "Expires in:  unknown (clock not synchronized)")?;
    } else {
        write!(text, "Expires in:  {} days", info.days_until_expiry)?;
    }
    Ok(text)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
