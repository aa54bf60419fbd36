//! Ephemeral-static ECDH on P-256 and HKDF-SHA256 key derivation.

use hkdf::Hkdf;
use log::debug;
use p256::{
    ecdh::{diffie_hellman, SharedSecret},
    pkcs8::{DecodePublicKey, EncodePublicKey},
    PublicKey, SecretKey,
};
use rand_core::OsRng;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ImageCryptoError, Result};

/// HKDF `info` string binding derived keys to this application.
pub const HKDF_INFO: &[u8] = b"ecdh-image-encryption";
pub const SALT_LEN: usize = 16;
pub const DERIVED_KEY_LEN: usize = 32;

/// Per-message AES-256 key. Wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_LEN]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; DERIVED_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Sender key pair, generated for exactly one message.
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// DER SubjectPublicKeyInfo, the form carried in the packet.
    pub fn encoded_public_key(&self) -> Result<Vec<u8>> {
        encode_public_key(&self.public)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Sender side: fresh ephemeral key, ECDH against the receiver's static key.
pub fn encrypt_side(receiver_public: &PublicKey) -> (EphemeralKeyPair, SharedSecret) {
    let ephemeral = EphemeralKeyPair::generate();
    let shared = diffie_hellman(
        ephemeral.secret.to_nonzero_scalar(),
        receiver_public.as_affine(),
    );
    (ephemeral, shared)
}

/// Receiver side: the same secret from the static private key and the
/// sender's ephemeral public key.
pub fn decrypt_side(sender_public: &PublicKey, receiver_private: &SecretKey) -> SharedSecret {
    diffie_hellman(
        receiver_private.to_nonzero_scalar(),
        sender_public.as_affine(),
    )
}

/// HKDF-SHA256(salt, shared_secret, info = [`HKDF_INFO`]) → 32 bytes.
pub fn derive_key(shared_secret: &[u8], salt: &[u8]) -> Result<DerivedKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = [0u8; DERIVED_KEY_LEN];
    hkdf.expand(HKDF_INFO, &mut okm)
        .map_err(|e| ImageCryptoError::EncryptionError(format!("HKDF expand failed: {}", e)))?;

    let key = DerivedKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    super::random_bytes::<SALT_LEN>()
}

pub fn encode_public_key(public: &PublicKey) -> Result<Vec<u8>> {
    let document = public.to_public_key_der()
        .map_err(|e| ImageCryptoError::EncryptionError(format!("public key encoding failed: {}", e)))?;
    Ok(document.as_bytes().to_vec())
}

/// Accepts DER SubjectPublicKeyInfo or a bare SEC1 point.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if let Ok(public) = PublicKey::from_public_key_der(bytes) {
        return Ok(public);
    }

    debug!("Sender key is not SPKI DER, trying SEC1 point ({} bytes)", bytes.len());
    PublicKey::from_sec1_bytes(bytes).map_err(|_| {
        ImageCryptoError::MalformedPacketError(format!(
            "sender public key ({} bytes) is not a valid P-256 point",
            bytes.len()
        ))
    })
}
