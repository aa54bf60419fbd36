//! Payload encryption module
//!
//! AES-256-GCM over the permuted pixel bytes, with a detached tag so the
//! packet can carry nonce, tag and ciphertext as separate fields.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};

use super::handshake::DerivedKey;
use crate::error::{ImageCryptoError, Result};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    pub fn new(key: &DerivedKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| ImageCryptoError::EncryptionError(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypts under a fresh random nonce. `aad` is authenticated, not
    /// encrypted.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedPayload> {
        let nonce = generate_nonce();
        let mut buffer = plaintext.to_vec();
        let tag = self.cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
            .map_err(|_| ImageCryptoError::EncryptionError("AES-GCM encryption failed".to_string()))?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok(SealedPayload {
            ciphertext: buffer,
            nonce,
            tag: tag_bytes,
        })
    }

    /// Verifies the tag and decrypts. On failure the working buffer is
    /// dropped, so no plaintext bytes escape.
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_LEN],
        tag: &[u8; TAG_LEN],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer, Tag::from_slice(tag))
            .map_err(|_| ImageCryptoError::AuthenticationError)?;
        Ok(buffer)
    }
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    super::random_bytes::<NONCE_LEN>()
}
