//! Config Pack Protocol Engine
//!
//! Builds, verifies and opens `.tscfg` envelopes with the device identity:
//!
//! - `create`: ECDH with the recipient certificate key, HKDF-SHA256,
//!   AES-256-GCM, then an ECDSA signature by this device
//! - `verify`: signer certificate, optional chain validation, signature
//! - `load`: `verify`, recipient fingerprint gate, decryption, content hash
//!
//! The engine also manages the pack directory: import, listing and loading
//! stored packs, and the `.tscfg`-over-`.json` priority rule.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::PublicKey;
use serde_json::Value;

use devtrust_common::logging::{Component, Logger};
use devtrust_common::time::{format_iso8601, parse_iso8601};
use devtrust_common::{log_debug, log_info, log_warn};
use devtrust_keys::{
    pem_fingerprint, CertificateValidator, DeviceIdentityManager, KeyError, X509Certificate,
};

use crate::codec::{
    self, ConfigPackEnvelope, EncryptionParams, EnvelopeMetadata, SignatureBlock, SignatureScope,
    ENCRYPTION_ALGORITHM, PACK_EXTENSION, PACK_VERSION,
};
use crate::config::PackConfig;
use crate::crypto;
use crate::error::{PackError, Result};
use crate::policy::{ChainValidation, DEVELOPER_OU};
use crate::types::{
    CreateOptions, ImportedPack, LoadedPack, PackMetadata, PackStatus, PriorityLoad,
    SignatureInfo,
};

/// `target_device` written when the recipient certificate has no CN
const UNKNOWN_DEVICE: &str = "unknown";
const DEVICE_TYPE_DEVICE: &str = "Device";

pub struct ConfigPackEngine {
    identity: Arc<DeviceIdentityManager>,
    config: PackConfig,
    logger: Arc<Logger>,
    codec_logger: Arc<Logger>,
}

impl ConfigPackEngine {
    pub fn new(
        identity: Arc<DeviceIdentityManager>,
        config: PackConfig,
        logger: Arc<Logger>,
    ) -> Self {
        let logger = Arc::new(logger.with_component(Component::Pack));
        let codec_logger = Arc::new(logger.with_component(Component::Codec));
        Self {
            identity,
            config,
            logger,
            codec_logger,
        }
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<DeviceIdentityManager> {
        &self.identity
    }

    /// True when the installed certificate's OU satisfies the export policy
    pub fn can_export(&self) -> bool {
        self.identity
            .get_info()
            .map(|info| self.config.export_policy.allows(&info.subject_ou))
            .unwrap_or(false)
    }

    /// Encrypt `content` for the holder of `recipient_cert_pem` and sign it
    /// with this device's key. Returns the envelope JSON.
    pub fn create(
        &self,
        name: &str,
        content: &[u8],
        recipient_cert_pem: &str,
        options: &CreateOptions,
    ) -> Result<String> {
        validate_pack_name(name)?;
        if content.is_empty() {
            return Err(PackError::InvalidArgument("pack content is empty".to_string()));
        }
        if !self.can_export() {
            return Err(PackError::Permission(
                "device certificate is not authorized to export packs".to_string(),
            ));
        }

        let recipient = X509Certificate::from_pem(recipient_cert_pem).map_err(|e| {
            PackError::InvalidArgument(format!("Invalid recipient certificate: {e}"))
        })?;
        let recipient_key = recipient.public_key().map_err(|e| {
            PackError::InvalidArgument(format!("Unsupported recipient public key: {e}"))
        })?;
        let recipient_public = PublicKey::from(&recipient_key);
        let target_device = recipient
            .subject_cn()
            .ok()
            .filter(|cn| !cn.is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());

        let sealed = crypto::seal(&recipient_public, content)?;
        let timestamp = format_iso8601(self.identity.clock().now_unix());
        let scope = self.config.signature_scope;

        let envelope = self.identity.with_credentials(|creds| -> Result<ConfigPackEnvelope> {
            let signer_cn = creds.certificate.subject_cn()?;
            let signer_ou = creds.certificate.subject_ou()?;
            // Re-checked under the identity lock in case the certificate changed
            if !self.config.export_policy.allows(&signer_ou) {
                return Err(PackError::Permission(format!(
                    "signer OU '{signer_ou}' is not authorized to export packs"
                )));
            }

            let mut envelope = ConfigPackEnvelope {
                version: PACK_VERSION.to_string(),
                metadata: EnvelopeMetadata {
                    name: Some(name.to_string()),
                    description: options.description.clone(),
                    created_at: Some(timestamp.clone()),
                    created_by: Some(signer_cn),
                    target_device: Some(target_device.clone()),
                    source_file: Some(format!("{name}.json")),
                    content_hash: Some(STANDARD.encode(crypto::sha256(content))),
                },
                encryption: EncryptionParams {
                    ephemeral_public_key: sealed.ephemeral_public_key,
                    salt: sealed.salt,
                    iv: sealed.iv,
                    tag: sealed.tag,
                    recipient_cert_fingerprint: pem_fingerprint(recipient_cert_pem),
                },
                signature: SignatureBlock {
                    signer_certificate: creds.certificate_pem.to_string(),
                    signature: Vec::new(),
                    signed_at: Some(timestamp.clone()),
                    is_official: true,
                    scope,
                },
                ciphertext: sealed.ciphertext,
            };
            let digest = signing_digest(&envelope);
            envelope.signature.signature =
                crypto::sign_digest(creds.key_pair.signing_key(), &digest)?;
            Ok(envelope)
        })??;

        log_info!(
            self.logger.with_operation(name),
            "Created pack for {} ({} bytes, scope={:?})",
            target_device,
            content.len(),
            scope
        );
        self.encode_envelope(&envelope)
    }

    /// Check the signer and signature without decrypting
    pub fn verify(&self, envelope_json: &str) -> Result<SignatureInfo> {
        let envelope = self.parse_envelope(envelope_json)?;
        self.verify_envelope(&envelope)
    }

    /// Verify, check the recipient binding and decrypt
    pub fn load(&self, envelope_json: &str) -> Result<LoadedPack> {
        let envelope = self.parse_envelope(envelope_json)?;
        let sig_info = self.verify_envelope(&envelope)?;

        let opened = self.identity.with_credentials(|creds| -> Result<Vec<u8>> {
            let own_fingerprint = pem_fingerprint(creds.certificate_pem);
            check_fingerprint(&envelope, &own_fingerprint)?;
            let encryption = &envelope.encryption;
            crypto::open(
                creds.key_pair.signing_key(),
                &encryption.ephemeral_public_key,
                &encryption.salt,
                &encryption.iv,
                &encryption.tag,
                &envelope.ciphertext,
            )
        });
        let content = match opened {
            Ok(result) => result?,
            Err(KeyError::NotFound(_)) => {
                return Err(PackError::Recipient(
                    "device has no certificate installed".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(expected) = &envelope.metadata.content_hash {
            let actual = STANDARD.encode(crypto::sha256(&content));
            if &actual != expected {
                return Err(PackError::Integrity(format!(
                    "expected {expected}, decrypted content hashes to {actual}"
                )));
            }
        }

        let metadata = PackMetadata::from(&envelope.metadata);
        log_info!(
            self.logger.with_operation(metadata.name.as_str()),
            "Loaded pack signed by {} (official={})",
            sig_info.signer_cn,
            sig_info.is_official
        );
        Ok(LoadedPack {
            metadata,
            content,
            sig_info,
        })
    }

    /// Write envelope JSON to `path`, creating parent directories
    pub fn save(&self, path: &Path, envelope_json: &str) -> Result<()> {
        write_file(path, envelope_json.as_bytes())
            .map_err(|e| PackError::Io(format!("{}: {e}", path.display())))?;
        log_debug!(self.logger, "Saved pack to {}", path.display());
        Ok(())
    }

    pub fn load_file(&self, path: &Path) -> Result<LoadedPack> {
        let json = self.read_pack_file(path)?;
        self.load(&json)
    }

    pub fn verify_file(&self, path: &Path) -> Result<SignatureInfo> {
        let json = self.read_pack_file(path)?;
        self.verify(&json)
    }

    /// Check a pack addressed to this device and store it, still encrypted,
    /// as `<pack_dir>/<name>.tscfg`
    pub fn import(&self, envelope_json: &str) -> Result<ImportedPack> {
        let (metadata, sig_info) = self.check_addressed_pack(envelope_json)?;
        validate_pack_name(&metadata.name)?;

        let saved_path = self.pack_path(&metadata.name);
        self.save(&saved_path, envelope_json)?;
        log_info!(
            self.logger.with_operation(metadata.name.as_str()),
            "Imported pack from {} to {}",
            sig_info.signer_cn,
            saved_path.display()
        );
        Ok(ImportedPack {
            metadata,
            sig_info,
            saved_path,
        })
    }

    /// The checks of `import` for a pack file, without storing it
    pub fn validate_file(&self, path: &Path) -> Result<PackMetadata> {
        let json = self.read_pack_file(path)?;
        let (metadata, _) = self.check_addressed_pack(&json)?;
        Ok(metadata)
    }

    /// Decrypt a pack whose content is a JSON object of modules and hand
    /// each `(module, config)` entry to `applier`. Returns the module names.
    pub fn apply_file<F>(&self, path: &Path, mut applier: F) -> Result<Vec<String>>
    where
        F: FnMut(&str, &Value) -> Result<()>,
    {
        let pack = self.load_file(path)?;
        let document: Value = serde_json::from_slice(&pack.content)
            .map_err(|e| PackError::Parse(format!("pack content is not JSON: {e}")))?;
        let modules = document
            .as_object()
            .ok_or_else(|| PackError::Parse("pack content is not a JSON object".to_string()))?;

        let mut applied = Vec::with_capacity(modules.len());
        for (module, config) in modules {
            applier(module, config)?;
            log_debug!(self.logger, "Applied module '{}'", module);
            applied.push(module.clone());
        }
        log_info!(
            self.logger,
            "Applied {} module(s) from pack '{}'",
            applied.len(),
            pack.metadata.name
        );
        Ok(applied)
    }

    /// Names of the packs in the pack directory, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.config.pack_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !has_extension(&path, PACK_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Plaintext of a stored pack
    pub fn get_content(&self, name: &str) -> Result<Vec<u8>> {
        validate_pack_name(name)?;
        Ok(self.load_file(&self.pack_path(name))?.content)
    }

    /// True when `json_path` ends in `.json` and its `.tscfg` sibling exists
    pub fn tscfg_exists(json_path: &Path) -> bool {
        has_extension(json_path, "json") && json_path.with_extension(PACK_EXTENSION).is_file()
    }

    /// Content for a `.json` config path, preferring the encrypted sibling.
    ///
    /// A `.tscfg` that fails to load is logged and the plain file is used.
    pub fn load_with_priority(&self, json_path: &Path) -> Result<PriorityLoad> {
        if !has_extension(json_path, "json") {
            return Err(PackError::InvalidArgument(format!(
                "{} is not a .json path",
                json_path.display()
            )));
        }

        let tscfg_path = json_path.with_extension(PACK_EXTENSION);
        if tscfg_path.is_file() {
            match self.load_file(&tscfg_path) {
                Ok(pack) => {
                    log_debug!(self.logger, "Using encrypted {}", tscfg_path.display());
                    return Ok(PriorityLoad {
                        content: pack.content,
                        used_tscfg: true,
                    });
                }
                Err(e) => log_warn!(
                    self.logger,
                    "Failed to load {} ({}), falling back to {}",
                    tscfg_path.display(),
                    e,
                    json_path.display()
                ),
            }
        }

        match fs::read(json_path) {
            Ok(content) => Ok(PriorityLoad {
                content,
                used_tscfg: false,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PackError::Io(format!(
                "neither {} nor {} is available",
                tscfg_path.display(),
                json_path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// This device's certificate PEM, for handing to pack creators
    pub fn export_device_cert(&self) -> Result<String> {
        Ok(self.identity.get_certificate()?)
    }

    pub fn device_fingerprint(&self) -> Result<String> {
        Ok(self.identity.fingerprint()?)
    }

    pub fn status(&self) -> PackStatus {
        let info = self.identity.get_info().ok();
        let can_export = info
            .as_ref()
            .map(|info| self.config.export_policy.allows(&info.subject_ou))
            .unwrap_or(false);
        PackStatus {
            can_export,
            device_type: if can_export {
                DEVELOPER_OU
            } else {
                DEVICE_TYPE_DEVICE
            }
            .to_string(),
            cert_fingerprint: self.identity.fingerprint().ok(),
            cert_cn: info.as_ref().map(|info| info.subject_cn.clone()),
            cert_ou: info.map(|info| info.subject_ou),
            pack_version: PACK_VERSION.to_string(),
            algorithm: ENCRYPTION_ALGORITHM.to_string(),
        }
    }

    fn verify_envelope(&self, envelope: &ConfigPackEnvelope) -> Result<SignatureInfo> {
        let signer = X509Certificate::from_pem(&envelope.signature.signer_certificate)
            .map_err(|e| PackError::CertChain(format!("Invalid signer certificate: {e}")))?;
        let signer_cn = signer
            .subject_cn()
            .map_err(|e| PackError::CertChain(e.to_string()))?;
        let signer_ou = signer
            .subject_ou()
            .map_err(|e| PackError::CertChain(e.to_string()))?;

        self.validate_chain(&signer)?;

        let verifying_key = signer
            .public_key()
            .map_err(|e| PackError::CertChain(format!("Unsupported signer key: {e}")))?;
        crypto::verify_digest(
            &verifying_key,
            &signing_digest(envelope),
            &envelope.signature.signature,
        )?;

        let is_official = self.config.export_policy.allows(&signer_ou);
        log_debug!(
            self.logger,
            "Signature valid: signer={} ou={} official={}",
            signer_cn,
            signer_ou,
            is_official
        );
        Ok(SignatureInfo {
            valid: true,
            is_official,
            signer_cn,
            signer_ou,
            signed_at: envelope
                .signature
                .signed_at
                .as_deref()
                .and_then(parse_iso8601)
                .unwrap_or(0),
        })
    }

    fn validate_chain(&self, signer: &X509Certificate) -> Result<()> {
        let mode = self.config.chain_validation;
        if mode == ChainValidation::Disabled {
            return Ok(());
        }

        let device_chain = match self.identity.get_ca_chain() {
            Ok(chain) => Some(chain),
            Err(KeyError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let anchors = device_chain
            .iter()
            .chain(self.config.trust_anchors.iter())
            .map(String::as_str);
        let validator = CertificateValidator::from_pem_bundles(anchors)
            .map_err(|e| PackError::CertChain(format!("Invalid trust anchor: {e}")))?;

        if validator.is_empty() {
            if mode == ChainValidation::Required {
                return Err(PackError::CertChain(
                    "no trust anchors available".to_string(),
                ));
            }
            log_debug!(self.logger, "No trust anchors, skipping chain validation");
            return Ok(());
        }

        let clock = self.identity.clock();
        validator
            .validate_certificate(signer, clock.as_ref())
            .map_err(|e| PackError::CertChain(e.to_string()))
    }

    fn parse_envelope(&self, envelope_json: &str) -> Result<ConfigPackEnvelope> {
        codec::parse(envelope_json).map_err(|e| {
            log_debug!(self.codec_logger, "Rejected envelope: {}", e);
            e
        })
    }

    fn encode_envelope(&self, envelope: &ConfigPackEnvelope) -> Result<String> {
        let json = codec::serialize(envelope)?;
        log_debug!(
            self.codec_logger,
            "Encoded envelope v{} ({} bytes)",
            envelope.version,
            json.len()
        );
        Ok(json)
    }

    /// Parse a pack, require it to be addressed to this device and verify it
    fn check_addressed_pack(&self, envelope_json: &str) -> Result<(PackMetadata, SignatureInfo)> {
        let envelope = self.parse_envelope(envelope_json)?;
        let own_fingerprint = match self.identity.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(KeyError::NotFound(_)) => {
                return Err(PackError::Recipient(
                    "device has no certificate installed".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        check_fingerprint(&envelope, &own_fingerprint)?;
        let sig_info = self.verify_envelope(&envelope)?;
        Ok((PackMetadata::from(&envelope.metadata), sig_info))
    }

    fn read_pack_file(&self, path: &Path) -> Result<String> {
        let size = fs::metadata(path)
            .map_err(|e| PackError::Io(format!("{}: {e}", path.display())))?
            .len();
        if size == 0 || size > self.config.max_pack_size as u64 {
            return Err(PackError::InvalidArgument(format!(
                "{}: size {} outside 1..={}",
                path.display(),
                size,
                self.config.max_pack_size
            )));
        }
        let bytes =
            fs::read(path).map_err(|e| PackError::Io(format!("{}: {e}", path.display())))?;
        String::from_utf8(bytes)
            .map_err(|_| PackError::Parse(format!("{} is not UTF-8", path.display())))
    }

    fn pack_path(&self, name: &str) -> PathBuf {
        self.config
            .pack_dir
            .join(format!("{name}.{PACK_EXTENSION}"))
    }
}

fn signing_digest(envelope: &ConfigPackEnvelope) -> [u8; 32] {
    match envelope.signature.scope {
        SignatureScope::Ciphertext => crypto::sha256(&envelope.ciphertext),
        SignatureScope::Envelope => crypto::sha256(&codec::canonical_signing_input(envelope)),
    }
}

fn check_fingerprint(envelope: &ConfigPackEnvelope, own_fingerprint: &str) -> Result<()> {
    let target = &envelope.encryption.recipient_cert_fingerprint;
    if target.eq_ignore_ascii_case(own_fingerprint) {
        Ok(())
    } else {
        Err(PackError::Recipient(format!(
            "pack is addressed to {target}, this device is {own_fingerprint}"
        )))
    }
}

/// Pack names become file names inside the pack directory
pub fn validate_pack_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(PackError::InvalidArgument(format!(
            "invalid pack name '{}'",
            name.escape_debug()
        )));
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(content)?;
        f.sync_all()?;
    }
    fs::rename(tmp_path, path)
}
