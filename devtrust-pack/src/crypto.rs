//! Hybrid encryption and signing primitives for config packs
//!
//! ECIES-style: an ephemeral P-256 key agrees a secret with the recipient's
//! certificate key, HKDF-SHA256 turns it into an AES-256-GCM key, and the
//! sender signs with its device key. Shared secrets and AES keys live only in
//! zeroize-on-drop buffers.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use hkdf::Hkdf;
use p256::ecdh::{diffie_hellman, EphemeralSecret, SharedSecret};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{DerSignature, Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use devtrust_keys::SecretArray;

use crate::codec::{EPHEMERAL_KEY_LEN, IV_LEN, SALT_LEN, TAG_LEN};
use crate::error::{PackError, Result};

/// HKDF info string binding derived keys to this protocol
pub const HKDF_INFO: &[u8] = b"tscfg-aes-key-v1";
pub const AES_KEY_LEN: usize = 32;

/// Output of [`seal`]
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub ephemeral_public_key: [u8; EPHEMERAL_KEY_LEN],
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Encrypt `plaintext` for the holder of `recipient`'s private key
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<SealedPayload> {
    let ephemeral_secret = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = ephemeral_secret.public_key().to_encoded_point(false);
    let ephemeral_public_key: [u8; EPHEMERAL_KEY_LEN] = ephemeral_public
        .as_bytes()
        .try_into()
        .map_err(|_| PackError::InvalidArgument("unexpected ephemeral key encoding".into()))?;

    let shared_secret = ephemeral_secret.diffie_hellman(recipient);
    drop(ephemeral_secret);

    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let aes_key = derive_aes_key(&shared_secret, &salt)?;
    drop(shared_secret);

    let cipher = Aes256Gcm::new_from_slice(aes_key.as_bytes())
        .map_err(|e| PackError::InvalidArgument(format!("invalid AES key: {e}")))?;
    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut ciphertext)
        .map_err(|_| PackError::InvalidArgument("AES-GCM encryption failed".into()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(SealedPayload {
        ephemeral_public_key,
        salt,
        iv,
        tag: tag_bytes,
        ciphertext,
    })
}

/// Decrypt a sealed payload with the recipient's static key.
///
/// Any failure after the ephemeral key parses is [`PackError::Decrypt`];
/// no plaintext is returned unless the GCM tag verifies.
pub fn open(
    device_key: &SigningKey,
    ephemeral_public_key: &[u8; EPHEMERAL_KEY_LEN],
    salt: &[u8; SALT_LEN],
    iv: &[u8; IV_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let ephemeral_public = PublicKey::from_sec1_bytes(ephemeral_public_key)
        .map_err(|e| PackError::Decrypt(format!("invalid ephemeral public key: {e}")))?;

    let shared_secret =
        diffie_hellman(device_key.as_nonzero_scalar(), ephemeral_public.as_affine());
    let aes_key = derive_aes_key(&shared_secret, salt)?;
    drop(shared_secret);

    let cipher = Aes256Gcm::new_from_slice(aes_key.as_bytes())
        .map_err(|e| PackError::Decrypt(format!("invalid AES key: {e}")))?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| PackError::Decrypt("authentication tag mismatch".into()))?;
    Ok(buffer)
}

fn derive_aes_key(
    shared_secret: &SharedSecret,
    salt: &[u8; SALT_LEN],
) -> Result<SecretArray<AES_KEY_LEN>> {
    let hk = Hkdf::<Sha256>::new(
        Some(salt.as_slice()),
        shared_secret.raw_secret_bytes().as_slice(),
    );
    let mut key = SecretArray::<AES_KEY_LEN>::zeroed();
    hk.expand(HKDF_INFO, key.as_mut_bytes())
        .map_err(|e| PackError::InvalidArgument(format!("HKDF expansion failed: {e}")))?;
    Ok(key)
}

/// Sign a SHA-256 digest; returns the DER-encoded signature
pub fn sign_digest(signing_key: &SigningKey, digest: &[u8; 32]) -> Result<Vec<u8>> {
    let signature: Signature = signing_key
        .sign_prehash(digest)
        .map_err(|e| PackError::InvalidArgument(format!("ECDSA signing failed: {e}")))?;
    let der: DerSignature = signature.to_der();
    Ok(der.as_bytes().to_vec())
}

/// Verify a DER-encoded signature over a SHA-256 digest
pub fn verify_digest(
    verifying_key: &VerifyingKey,
    digest: &[u8; 32],
    signature_der: &[u8],
) -> Result<()> {
    let signature = Signature::from_der(signature_der)
        .map_err(|e| PackError::Signature(format!("malformed signature: {e}")))?;
    verifying_key
        .verify_prehash(digest, &signature)
        .map_err(|_| PackError::Signature("signature does not match signer certificate".into()))
}
