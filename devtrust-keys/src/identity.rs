//! Device Identity Manager
//!
//! Owns the device's ECDSA P-256 key pair, its CA-issued certificate and the
//! CA chain. State is guarded by a mutex so key rotation, certificate
//! installation and pack operations borrowing the key never interleave.
//!
//! Status lifecycle:
//!
//! ```text
//! NotInitialized -> KeyGenerated -> CsrPending -> Activated <-> Expired
//!                                                   (Error until reset)
//! ```

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use devtrust_common::logging::{Component, Logger};
use devtrust_common::time::TimeSource;
use devtrust_common::{log_debug, log_error, log_info, log_warn};

use crate::certificate::{
    pem_fingerprint, CertInfo, CertValidity, CertificateRequest, CsrOptions, EcdsaKeyPair,
    X509Certificate,
};
use crate::config::IdentityConfig;
use crate::error::{KeyError, Result};
use crate::secret::SecretBytes;
use crate::store::IdentityStore;

/// Store key of the PKCS#8 PEM private key
pub const KEY_PRIVATE_KEY: &str = "privkey";
/// Store key of the device certificate PEM
pub const KEY_CERTIFICATE: &str = "cert";
/// Store key of the CA chain PEM
pub const KEY_CA_CHAIN: &str = "ca_chain";

/// PKI activation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PkiStatus {
    /// No key pair generated
    NotInitialized,
    /// Key pair exists, no CSR yet
    KeyGenerated,
    /// CSR generated, awaiting certificate
    CsrPending,
    /// Certificate installed and usable
    Activated,
    /// Certificate outside its validity window
    Expired,
    /// Persisted identity could not be loaded
    Error,
}

impl PkiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkiStatus::NotInitialized => "not_initialized",
            PkiStatus::KeyGenerated => "key_generated",
            PkiStatus::CsrPending => "csr_pending",
            PkiStatus::Activated => "activated",
            PkiStatus::Expired => "expired",
            PkiStatus::Error => "error",
        }
    }
}

impl fmt::Display for PkiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the identity for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiStatusReport {
    pub status: PkiStatus,
    pub validity: Option<CertValidity>,
    pub has_private_key: bool,
    pub has_certificate: bool,
    pub has_ca_chain: bool,
    pub cert_info: Option<CertInfo>,
}

/// Borrowed view of the device credentials, valid while the identity lock is held
pub struct DeviceCredentials<'a> {
    pub key_pair: &'a EcdsaKeyPair,
    pub certificate: &'a X509Certificate,
    pub certificate_pem: &'a str,
    pub ca_chain_pem: Option<&'a str>,
}

struct InstalledCertificate {
    pem: String,
    certificate: X509Certificate,
}

struct IdentityState {
    key_pair: Option<EcdsaKeyPair>,
    certificate: Option<InstalledCertificate>,
    ca_chain: Option<String>,
    status: PkiStatus,
}

impl IdentityState {
    fn empty() -> Self {
        Self {
            key_pair: None,
            certificate: None,
            ca_chain: None,
            status: PkiStatus::NotInitialized,
        }
    }
}

/// Device Identity Manager
pub struct DeviceIdentityManager {
    state: Mutex<IdentityState>,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn TimeSource>,
    config: IdentityConfig,
    logger: Arc<Logger>,
    store_logger: Arc<Logger>,
}

impl DeviceIdentityManager {
    /// Open the identity manager, loading any persisted credentials.
    ///
    /// Store failures are returned. A persisted blob that does not parse, or a
    /// certificate that does not match the stored key, puts the manager into
    /// `PkiStatus::Error` instead, so the caller can still reach
    /// `factory_reset` or `generate_keypair`. A mismatched certificate is
    /// never loaded.
    pub fn open(
        store: Arc<dyn IdentityStore>,
        config: IdentityConfig,
        clock: Arc<dyn TimeSource>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let logger = Arc::new(logger.with_component(Component::Identity));
        let namespace = config.namespace.as_str();
        let mut state = IdentityState::empty();
        let mut load_failed = false;

        if let Some(key_pem) = store.get(namespace, KEY_PRIVATE_KEY)? {
            match EcdsaKeyPair::from_pkcs8_pem(key_pem.as_str()?) {
                Ok(key_pair) => state.key_pair = Some(key_pair),
                Err(e) => {
                    log_error!(logger, "Stored private key is unreadable: {}", e);
                    load_failed = true;
                }
            }
        }

        if let Some(cert_pem) = store.get(namespace, KEY_CERTIFICATE)? {
            let pem = String::from_utf8_lossy(cert_pem.as_bytes()).into_owned();
            match X509Certificate::from_pem(&pem) {
                Ok(certificate) => {
                    state.certificate = Some(InstalledCertificate { pem, certificate })
                }
                Err(e) => {
                    log_error!(logger, "Stored certificate is unreadable: {}", e);
                    load_failed = true;
                }
            }
        }

        let mismatched = match (&state.key_pair, &state.certificate) {
            (Some(key_pair), Some(installed)) => {
                installed.certificate.public_key_der()? != key_pair.public_key_der()?
            }
            _ => false,
        };
        if mismatched {
            log_error!(logger, "Stored certificate does not match the stored key");
            state.certificate = None;
            load_failed = true;
        }

        if let Some(chain) = store.get(namespace, KEY_CA_CHAIN)? {
            state.ca_chain = Some(String::from_utf8_lossy(chain.as_bytes()).into_owned());
        }

        let store_logger = Arc::new(logger.with_component(Component::Store));
        let manager = Self {
            state: Mutex::new(state),
            store,
            clock,
            config,
            logger,
            store_logger,
        };

        {
            let mut state = manager.lock()?;
            state.status = if load_failed {
                PkiStatus::Error
            } else {
                manager.compute_status(&state)
            };
            log_info!(
                manager.logger,
                "Identity loaded: status={} key={} cert={} ca_chain={}",
                state.status,
                state.key_pair.is_some(),
                state.certificate.is_some(),
                state.ca_chain.is_some()
            );
        }

        Ok(manager)
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn TimeSource> {
        self.clock.clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, IdentityState>> {
        self.state
            .lock()
            .map_err(|_| KeyError::InvalidState("identity lock poisoned".to_string()))
    }

    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn persist(&self, key: &str, value: &[u8]) -> Result<()> {
        self.store.set(self.namespace(), key, value)?;
        log_debug!(
            self.store_logger,
            "Wrote {}/{} ({} bytes)",
            self.namespace(),
            key,
            value.len()
        );
        Ok(())
    }

    fn erase_blob(&self, key: &str) -> Result<()> {
        self.store.erase(self.namespace(), key)?;
        log_debug!(self.store_logger, "Erased {}/{}", self.namespace(), key);
        Ok(())
    }

    /// Status recomputation. While the clock is unsynchronized an installed
    /// certificate is reported as `Activated`.
    fn compute_status(&self, state: &IdentityState) -> PkiStatus {
        match (&state.key_pair, &state.certificate) {
            (Some(_), Some(installed)) => match installed.certificate.validity(&*self.clock) {
                Ok(CertValidity::Expired) => PkiStatus::Expired,
                Ok(_) => PkiStatus::Activated,
                Err(_) => PkiStatus::Error,
            },
            (Some(_), None) if state.status == PkiStatus::CsrPending => PkiStatus::CsrPending,
            (Some(_), None) => PkiStatus::KeyGenerated,
            (None, Some(_)) => PkiStatus::Error,
            (None, None) => PkiStatus::NotInitialized,
        }
    }

    fn update_status(&self, state: &mut IdentityState) -> PkiStatus {
        let previous = state.status;
        state.status = self.compute_status(state);
        if previous != state.status {
            log_info!(self.logger, "Status {} -> {}", previous, state.status);
        }
        state.status
    }

    /// Generate a new key pair. Any installed certificate is erased because it
    /// no longer matches the key.
    pub fn generate_keypair(&self) -> Result<()> {
        let mut state = self.lock()?;

        let key_pair = EcdsaKeyPair::generate();
        let key_pem = key_pair.to_pkcs8_pem()?;

        // The old certificate goes first so the store never pairs it with the new key
        self.erase_blob(KEY_CERTIFICATE)?;
        state.certificate = None;
        if let Err(e) = self.persist(KEY_PRIVATE_KEY, key_pem.as_bytes()) {
            self.update_status(&mut state);
            return Err(e);
        }

        state.key_pair = Some(key_pair);
        state.status = PkiStatus::KeyGenerated;
        log_info!(self.logger, "Generated new ECDSA P-256 key pair");
        Ok(())
    }

    pub fn has_keypair(&self) -> Result<bool> {
        Ok(self.lock()?.key_pair.is_some())
    }

    /// Erase the key pair and certificate. The CA chain is kept.
    pub fn delete_keypair(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.erase_blob(KEY_CERTIFICATE)?;
        self.erase_blob(KEY_PRIVATE_KEY)?;
        state.key_pair = None;
        state.certificate = None;
        state.status = PkiStatus::NotInitialized;
        log_warn!(self.logger, "Key pair and certificate deleted");
        Ok(())
    }

    /// Build a PEM CSR for the stored key
    pub fn generate_csr(&self, options: &CsrOptions) -> Result<String> {
        options.validate()?;
        let mut state = self.lock()?;
        let key_pair = state
            .key_pair
            .as_ref()
            .ok_or_else(|| KeyError::InvalidState("no private key generated".to_string()))?;

        let csr_pem = CertificateRequest::create(key_pair, options)?;
        state.status = PkiStatus::CsrPending;
        log_info!(
            self.logger,
            "Generated CSR for {} ({} IP SANs, {} DNS SANs)",
            options.subject(),
            options.ip_sans.len(),
            options.dns_sans.len()
        );
        Ok(csr_pem)
    }

    /// CSR with the configured default organization and unit
    pub fn generate_default_csr(&self, device_id: &str) -> Result<String> {
        self.generate_csr(&CsrOptions::with_defaults(device_id, &self.config))
    }

    /// Install a CA-issued certificate for the stored key
    pub fn install_certificate(&self, cert_pem: &str) -> Result<()> {
        let certificate = X509Certificate::from_pem(cert_pem)
            .map_err(|e| KeyError::InvalidArgument(format!("Invalid certificate: {}", e)))?;

        let mut state = self.lock()?;
        let key_pair = state
            .key_pair
            .as_ref()
            .ok_or_else(|| KeyError::InvalidState("no private key generated".to_string()))?;

        if certificate.public_key_der()? != key_pair.public_key_der()? {
            return Err(KeyError::InvalidState(
                "Certificate does not match private key".to_string(),
            ));
        }

        self.persist(KEY_CERTIFICATE, cert_pem.as_bytes())?;
        let subject_cn = certificate.subject_cn()?;
        state.certificate = Some(InstalledCertificate {
            pem: cert_pem.to_string(),
            certificate,
        });
        let status = self.update_status(&mut state);
        log_info!(
            self.logger,
            "Installed certificate CN={} status={}",
            subject_cn,
            status
        );
        Ok(())
    }

    /// Install the CA chain. Every PEM block must parse; no trust check is made
    /// against the device's own identity. A copy is written to the configured
    /// export path on a best-effort basis.
    pub fn install_ca_chain(&self, ca_chain_pem: &str) -> Result<()> {
        let certificates = X509Certificate::parse_pem_chain(ca_chain_pem)
            .map_err(|e| KeyError::InvalidArgument(format!("Invalid CA chain: {}", e)))?;

        let mut state = self.lock()?;
        self.persist(KEY_CA_CHAIN, ca_chain_pem.as_bytes())?;
        state.ca_chain = Some(ca_chain_pem.to_string());
        log_info!(
            self.logger,
            "Installed CA chain with {} certificate(s)",
            certificates.len()
        );

        if let Some(path) = &self.config.ca_chain_export_path {
            if let Err(e) = export_file(path, ca_chain_pem) {
                log_warn!(self.logger, "Could not export CA chain to {:?}: {}", path, e);
            } else {
                log_debug!(self.logger, "CA chain exported to {:?}", path);
            }
        }
        Ok(())
    }

    pub fn get_certificate(&self) -> Result<String> {
        let state = self.lock()?;
        state
            .certificate
            .as_ref()
            .map(|installed| installed.pem.clone())
            .ok_or_else(|| KeyError::NotFound("no certificate installed".to_string()))
    }

    pub fn get_ca_chain(&self) -> Result<String> {
        let state = self.lock()?;
        state
            .ca_chain
            .clone()
            .ok_or_else(|| KeyError::NotFound("no CA chain installed".to_string()))
    }

    /// Private key as PKCS#8 PEM, wiped when the returned buffer drops
    pub fn private_key_pem(&self) -> Result<SecretBytes> {
        let state = self.lock()?;
        state
            .key_pair
            .as_ref()
            .ok_or_else(|| KeyError::NotFound("no private key generated".to_string()))?
            .to_pkcs8_pem()
    }

    /// Fingerprint of the installed certificate
    pub fn fingerprint(&self) -> Result<String> {
        let state = self.lock()?;
        state
            .certificate
            .as_ref()
            .map(|installed| pem_fingerprint(&installed.pem))
            .ok_or_else(|| KeyError::NotFound("no certificate installed".to_string()))
    }

    /// Recompute and report the identity status
    pub fn get_status(&self) -> Result<PkiStatusReport> {
        let mut state = self.lock()?;
        if state.status != PkiStatus::Error {
            self.update_status(&mut state);
        }

        let (validity, cert_info) = match &state.certificate {
            Some(installed) => (
                Some(installed.certificate.validity(&*self.clock)?),
                Some(installed.certificate.info(&*self.clock)?),
            ),
            None => (None, None),
        };

        Ok(PkiStatusReport {
            status: state.status,
            validity,
            has_private_key: state.key_pair.is_some(),
            has_certificate: state.certificate.is_some(),
            has_ca_chain: state.ca_chain.is_some(),
            cert_info,
        })
    }

    pub fn status(&self) -> Result<PkiStatus> {
        Ok(self.get_status()?.status)
    }

    /// Details of the installed certificate
    pub fn get_info(&self) -> Result<CertInfo> {
        let state = self.lock()?;
        state
            .certificate
            .as_ref()
            .ok_or_else(|| KeyError::NotFound("no certificate installed".to_string()))?
            .certificate
            .info(&*self.clock)
    }

    /// True when the identity is activated
    pub fn is_valid(&self) -> bool {
        matches!(self.refresh_status(), Ok(PkiStatus::Activated))
    }

    /// Whole days until the certificate expires; `i32::MAX` when there is no
    /// certificate or the clock is unsynchronized
    pub fn days_until_expiry(&self) -> i32 {
        self.get_info()
            .map(|info| info.days_until_expiry)
            .unwrap_or(i32::MAX)
    }

    /// Recompute status after the clock changed
    pub fn refresh_status(&self) -> Result<PkiStatus> {
        let mut state = self.lock()?;
        if state.status == PkiStatus::Error {
            return Ok(PkiStatus::Error);
        }
        Ok(self.update_status(&mut state))
    }

    /// Erase every persisted identity blob
    pub fn factory_reset(&self) -> Result<()> {
        let mut state = self.lock()?;
        for key in [KEY_PRIVATE_KEY, KEY_CERTIFICATE, KEY_CA_CHAIN] {
            self.erase_blob(key)?;
        }
        *state = IdentityState::empty();
        log_warn!(self.logger, "Factory reset: identity erased");
        Ok(())
    }

    /// Run `f` with the device key and certificate while holding the identity
    /// lock. Fails with `NotFound` when no certificate is installed.
    pub fn with_credentials<R>(&self, f: impl FnOnce(DeviceCredentials<'_>) -> R) -> Result<R> {
        let state = self.lock()?;
        let installed = state
            .certificate
            .as_ref()
            .ok_or_else(|| KeyError::NotFound("no certificate installed".to_string()))?;
        let key_pair = state
            .key_pair
            .as_ref()
            .ok_or_else(|| KeyError::InvalidState("no private key generated".to_string()))?;

        Ok(f(DeviceCredentials {
            key_pair,
            certificate: &installed.certificate,
            certificate_pem: &installed.pem,
            ca_chain_pem: state.ca_chain.as_deref(),
        }))
    }
}

fn export_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}
