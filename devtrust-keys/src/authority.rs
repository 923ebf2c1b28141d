//! Lab certificate authority
//!
//! A local issuing helper for bench provisioning and tests: it holds a CA key
//! pair, self-signs its own certificate, and turns device CSRs into device
//! certificates. Issuance goes through OpenSSL. The CA certificate itself is
//! assembled with x509-cert and signed by the p256 key directly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use der::asn1::{OctetString, UtcTime};
use der::Encode;
use rand::RngCore;
use sha2::{Digest, Sha256};
use spki::ObjectIdentifier;
use x509_cert::ext::pkix::{
    BasicConstraints as CaConstraints, KeyUsage as CaKeyUsage, KeyUsages, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate, Version};

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Builder, X509Req, X509};

use devtrust_common::logging::{Component, Logger};
use devtrust_common::{log_debug, log_info};

use crate::certificate::{
    distinguished_name, ecdsa_sha256_algorithm, parse_csr, EcdsaKeyPair, X509Certificate,
    OID_COMMON_NAME, OID_ORGANIZATION,
};
use crate::error::{KeyError, Result};
use crate::secret::SecretBytes;

const CA_VALIDITY_DAYS: u64 = 3650;
const CA_ORGANIZATION: &str = "DevTrust Lab";

const OID_BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
const OID_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
const OID_SUBJECT_KEY_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

/// Certificate Authority for issuing device certificates
pub struct CertificateAuthority {
    ca_key_pair: EcdsaKeyPair,
    ca_certificate: X509Certificate,
    logger: Arc<Logger>,
}

impl CertificateAuthority {
    /// Create a new CA with a freshly generated key and self-signed certificate
    pub fn new(common_name: &str, logger: Arc<Logger>) -> Result<Self> {
        let ca_key_pair = EcdsaKeyPair::generate();
        let ca_certificate = Self::create_self_signed_certificate(&ca_key_pair, common_name)?;
        let logger = Arc::new(logger.with_component(Component::Authority));
        log_info!(logger, "Created lab CA '{}'", common_name);

        Ok(Self {
            ca_key_pair,
            ca_certificate,
            logger,
        })
    }

    /// Load an existing CA from its certificate and PKCS#8 private key
    pub fn from_pem(cert_pem: &str, key_pem: &str, logger: Arc<Logger>) -> Result<Self> {
        let ca_certificate = X509Certificate::from_pem(cert_pem)?;
        let ca_key_pair = EcdsaKeyPair::from_pkcs8_pem(key_pem)?;

        if ca_certificate.public_key_der()? != ca_key_pair.public_key_der()? {
            return Err(KeyError::InvalidState(
                "CA certificate does not match private key".to_string(),
            ));
        }

        Ok(Self {
            ca_key_pair,
            ca_certificate,
            logger: Arc::new(logger.with_component(Component::Authority)),
        })
    }

    pub fn ca_certificate(&self) -> &X509Certificate {
        &self.ca_certificate
    }

    pub fn ca_certificate_pem(&self) -> Result<String> {
        self.ca_certificate.to_pem()
    }

    pub fn private_key_pem(&self) -> Result<SecretBytes> {
        self.ca_key_pair.to_pkcs8_pem()
    }

    /// Issue a certificate valid from now for `validity_days`
    pub fn sign_csr_pem(&self, csr_pem: &str, validity_days: u32) -> Result<String> {
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(validity_days)?;
        self.sign(csr_pem, &not_before, &not_after)
    }

    /// Issue a certificate with an explicit validity window (Unix timestamps)
    pub fn sign_csr_pem_with_validity(
        &self,
        csr_pem: &str,
        not_before: i64,
        not_after: i64,
    ) -> Result<String> {
        if not_after <= not_before {
            return Err(KeyError::InvalidArgument(
                "not_after must be later than not_before".to_string(),
            ));
        }
        let not_before = Asn1Time::from_unix(not_before as _)?;
        let not_after = Asn1Time::from_unix(not_after as _)?;
        self.sign(csr_pem, &not_before, &not_after)
    }

    fn sign(&self, csr_pem: &str, not_before: &Asn1Time, not_after: &Asn1Time) -> Result<String> {
        let req = X509Req::from_pem(csr_pem.as_bytes())
            .map_err(|e| KeyError::InvalidArgument(format!("Failed to parse CSR: {}", e)))?;
        let req_public_key = req.public_key().map_err(|e| {
            KeyError::CertificateError(format!("Failed to extract public key from CSR: {}", e))
        })?;
        if !req.verify(&req_public_key)? {
            return Err(KeyError::InvalidArgument(
                "CSR signature does not verify".to_string(),
            ));
        }
        let details = parse_csr(csr_pem)?;

        let ca_private_key = self.ca_key_pair_to_openssl_pkey()?;
        let ca_x509 = X509::from_der(self.ca_certificate.der_bytes())?;

        let mut cert_builder = X509Builder::new()?;
        cert_builder.set_version(2)?;
        cert_builder.set_pubkey(&req_public_key)?;
        cert_builder.set_subject_name(req.subject_name())?;
        cert_builder.set_issuer_name(ca_x509.subject_name())?;
        cert_builder.set_not_before(not_before)?;
        cert_builder.set_not_after(not_after)?;

        let serial_number = {
            let mut bn = BigNum::new()?;
            bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
            bn.to_asn1_integer()?
        };
        cert_builder.set_serial_number(&serial_number)?;

        cert_builder.append_extension(BasicConstraints::new().critical().build()?)?;
        cert_builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_agreement()
                .build()?,
        )?;
        cert_builder.append_extension(
            ExtendedKeyUsage::new()
                .server_auth()
                .client_auth()
                .build()?,
        )?;

        if !details.ip_sans.is_empty() || !details.dns_sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for ip in &details.ip_sans {
                san.ip(&ip.to_string());
            }
            for dns in &details.dns_sans {
                san.dns(dns);
            }
            let san = san.build(&cert_builder.x509v3_context(Some(&*ca_x509), None))?;
            cert_builder.append_extension(san)?;
        }

        cert_builder.sign(&ca_private_key, MessageDigest::sha256())?;
        let pem = cert_builder.build().to_pem()?;

        log_debug!(
            self.logger,
            "Issued certificate for CN={} OU={}",
            details.subject_cn,
            details.subject_ou
        );

        String::from_utf8(pem)
            .map_err(|e| KeyError::CertificateError(format!("PEM is not UTF-8: {}", e)))
    }

    fn ca_key_pair_to_openssl_pkey(&self) -> Result<PKey<Private>> {
        let private_key_der = self.ca_key_pair.private_key_der()?;
        PKey::private_key_from_der(private_key_der.as_bytes()).map_err(|e| {
            KeyError::InvalidKeyFormat(format!("Failed to convert key to OpenSSL format: {}", e))
        })
    }

    fn create_self_signed_certificate(
        key_pair: &EcdsaKeyPair,
        common_name: &str,
    ) -> Result<X509Certificate> {
        let subject = distinguished_name(&[
            (OID_COMMON_NAME, common_name),
            (OID_ORGANIZATION, CA_ORGANIZATION),
        ])?;
        let public_key = key_pair.subject_public_key_info()?;

        let key_id = {
            let digest = Sha256::digest(public_key.subject_public_key.raw_bytes());
            SubjectKeyIdentifier(OctetString::new(&digest[..20])?)
        };
        let extensions = vec![
            Extension {
                extn_id: OID_BASIC_CONSTRAINTS,
                critical: true,
                extn_value: OctetString::new(
                    CaConstraints {
                        ca: true,
                        path_len_constraint: Some(0),
                    }
                    .to_der()?,
                )?,
            },
            Extension {
                extn_id: OID_KEY_USAGE,
                critical: true,
                extn_value: OctetString::new(
                    CaKeyUsage((KeyUsages::KeyCertSign | KeyUsages::CRLSign).into()).to_der()?,
                )?,
            },
            Extension {
                extn_id: OID_SUBJECT_KEY_ID,
                critical: false,
                extn_value: OctetString::new(key_id.to_der()?)?,
            },
        ];

        let not_before = SystemTime::now() - Duration::from_secs(60);
        let not_after = not_before + Duration::from_secs(CA_VALIDITY_DAYS * 24 * 60 * 60);

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: random_serial()?,
            signature: ecdsa_sha256_algorithm(),
            issuer: subject.clone(),
            validity: Validity {
                not_before: utc_time(not_before)?,
                not_after: utc_time(not_after)?,
            },
            subject,
            subject_public_key_info: public_key,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        };

        let (signature_algorithm, signature) = key_pair.sign_x509(&tbs_certificate.to_der()?)?;
        let certificate = Certificate {
            tbs_certificate,
            signature_algorithm,
            signature,
        };
        X509Certificate::from_der(certificate.to_der()?)
    }
}

/// Positive 64-bit serial from the OS CSPRNG
fn random_serial() -> Result<SerialNumber> {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    Ok(SerialNumber::new(&bytes)?)
}

fn utc_time(at: SystemTime) -> Result<Time> {
    let since_epoch = at
        .duration_since(UNIX_EPOCH)
        .map_err(|e| KeyError::CertificateError(format!("Time before Unix epoch: {}", e)))?;
    Ok(Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?))
}
