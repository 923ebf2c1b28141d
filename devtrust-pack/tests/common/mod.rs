//! Shared fixtures: a lab CA and provisioned devices with pack engines

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use devtrust_common::logging::{Component, Logger};
use devtrust_common::time::FixedTimeSource;
use devtrust_keys::{
    CertificateAuthority, CsrOptions, DeviceIdentityManager, IdentityConfig, MemoryIdentityStore,
};
use devtrust_pack::{ConfigPackEngine, PackConfig, Result};

pub const NET_CONFIG: &[u8] = b"{\"ssid\":\"lab\"}";

pub fn create_test_logger() -> Arc<Logger> {
    Arc::new(Logger::new_root(Component::System, "test"))
}

pub struct TestDevice {
    pub identity: Arc<DeviceIdentityManager>,
    pub engine: ConfigPackEngine,
    pub cert_pem: String,
}

impl TestDevice {
    /// Another engine over the same identity with a different configuration
    pub fn engine_with(&self, config: PackConfig) -> ConfigPackEngine {
        ConfigPackEngine::new(self.identity.clone(), config, create_test_logger())
    }
}

pub fn new_identity() -> Result<Arc<DeviceIdentityManager>> {
    let identity = DeviceIdentityManager::open(
        Arc::new(MemoryIdentityStore::new()),
        IdentityConfig {
            ca_chain_export_path: None,
            ..IdentityConfig::default()
        },
        Arc::new(FixedTimeSource::synced_now()),
        create_test_logger(),
    )?;
    Ok(Arc::new(identity))
}

pub fn provision_with_validity(
    ca: &CertificateAuthority,
    device_id: &str,
    org_unit: &str,
    validity: Option<(i64, i64)>,
    config: PackConfig,
) -> Result<TestDevice> {
    let identity = new_identity()?;
    identity.generate_keypair()?;
    let csr = identity.generate_csr(
        &CsrOptions::new(device_id)
            .organization("TianShanOS")
            .org_unit(org_unit),
    )?;
    let cert_pem = match validity {
        Some((not_before, not_after)) => {
            ca.sign_csr_pem_with_validity(&csr, not_before, not_after)?
        }
        None => ca.sign_csr_pem(&csr, 365)?,
    };
    identity.install_certificate(&cert_pem)?;
    let engine = ConfigPackEngine::new(identity.clone(), config, create_test_logger());
    Ok(TestDevice {
        identity,
        engine,
        cert_pem,
    })
}

pub fn provision(
    ca: &CertificateAuthority,
    device_id: &str,
    org_unit: &str,
    config: PackConfig,
) -> Result<TestDevice> {
    provision_with_validity(ca, device_id, org_unit, None, config)
}

pub fn pack_config(pack_dir: &Path) -> PackConfig {
    PackConfig::with_pack_dir(pack_dir)
}

pub fn lab_ca(common_name: &str) -> Result<CertificateAuthority> {
    Ok(CertificateAuthority::new(common_name, create_test_logger())?)
}

/// Flip one bit of a base64 field, at `section.field` or top-level `field`
pub fn flip_bit(json: &str, section: Option<&str>, field: &str, index: usize) -> String {
    let mut value: Value = serde_json::from_str(json).expect("envelope json");
    let target = match section {
        Some(section) => &mut value[section][field],
        None => &mut value[field],
    };
    let mut bytes = STANDARD
        .decode(target.as_str().expect("string field"))
        .expect("base64 field");
    let index = index.min(bytes.len() - 1);
    bytes[index] ^= 0x01;
    *target = Value::from(STANDARD.encode(bytes));
    value.to_string()
}

/// Replace a string field at `section.field`
pub fn set_field(json: &str, section: &str, field: &str, new_value: Value) -> String {
    let mut value: Value = serde_json::from_str(json).expect("envelope json");
    value[section][field] = new_value;
    value.to_string()
}
