//! Image encryption service
//!
//! `ImageCipher` is built once at startup around the receiver key pair and
//! handed to whatever needs it; it holds no mutable state, so one instance
//! serves any number of concurrent calls.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};
use p256::PublicKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::encryption::handshake::{self, decode_public_key, derive_key};
use crate::encryption::keys::ReceiverKeyPair;
use crate::encryption::metrics::{self, Metrics};
use crate::encryption::payload::Encryptor;
use crate::encryption::permutation::{self, seed_from_key};
use crate::error::{ImageCryptoError, Result};
use crate::image_io;
use crate::packet::{self, Packet};
use crate::types::Image;

/// Output of [`ImageCipher::encrypt_image`].
#[derive(Debug, Clone)]
pub struct EncryptedImage {
    pub packet: Vec<u8>,
    pub metrics: Metrics,
}

impl EncryptedImage {
    pub fn packet_base64(&self) -> String {
        STANDARD.encode(&self.packet)
    }

    pub fn report(&self) -> EncryptionReport {
        EncryptionReport {
            encrypted_data: self.packet_base64(),
            metrics: self.metrics,
        }
    }
}

/// Transport form: base64 packet plus metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionReport {
    pub encrypted_data: String,
    pub metrics: Metrics,
}

#[derive(Clone)]
pub struct ImageCipher {
    identity: Arc<ReceiverKeyPair>,
}

impl ImageCipher {
    pub fn new(identity: Arc<ReceiverKeyPair>) -> Self {
        Self { identity }
    }

    pub fn public_key(&self) -> &PublicKey {
        self.identity.public_key()
    }

    /// Decodes `image_bytes`, encrypts to this receiver and reports metrics
    /// for the permuted image.
    pub fn encrypt_image(&self, image_bytes: &[u8]) -> Result<EncryptedImage> {
        let start = Instant::now();
        let image = image_io::decode(image_bytes)?;
        let (packet, metrics) = seal_with_metrics(self.identity.public_key(), &image)?;
        let packet = packet.encode()?;

        info!(
            "Encrypted {}x{}x{} image into {} byte packet in {:?}",
            image.height(), image.width(), image.channels(), packet.len(), start.elapsed()
        );
        Ok(EncryptedImage { packet, metrics })
    }

    /// Recovers the image from a raw packet and re-encodes it as PNG.
    ///
    /// Packets sealed directly from an [`Image`] with more than four
    /// channels decrypt fine but have no PNG form; they fail here with
    /// `EncodeError` and must be read with [`ImageCipher::open`].
    pub fn decrypt_image(&self, packet_bytes: &[u8]) -> Result<Vec<u8>> {
        let image = self.open(packet_bytes)?;
        image_io::encode_png(&image)
    }

    pub fn decrypt_image_base64(&self, encoded: &str) -> Result<Vec<u8>> {
        let bytes = STANDARD.decode(encoded.trim())?;
        self.decrypt_image(&bytes)
    }

    pub fn seal(&self, image: &Image) -> Result<Packet> {
        seal(self.identity.public_key(), image)
    }

    pub fn open(&self, packet_bytes: &[u8]) -> Result<Image> {
        open(&self.identity, packet_bytes)
    }
}

/// Encrypts `image` to `receiver_public`. Needs no receiver secret, so a
/// sender can run it with only the published public key.
pub fn seal(receiver_public: &PublicKey, image: &Image) -> Result<Packet> {
    seal_inner(receiver_public, image, false).map(|(packet, _)| packet)
}

/// [`seal`], computing metrics on (original, permuted) alongside the AEAD.
pub fn seal_with_metrics(receiver_public: &PublicKey, image: &Image) -> Result<(Packet, Metrics)> {
    let (packet, metrics) = seal_inner(receiver_public, image, true)?;
    let metrics = metrics.ok_or_else(|| {
        ImageCryptoError::EncryptionError("metrics were not computed".to_string())
    })?;
    Ok((packet, metrics))
}

fn seal_inner(
    receiver_public: &PublicKey,
    image: &Image,
    with_metrics: bool,
) -> Result<(Packet, Option<Metrics>)> {
    let (ephemeral, shared) = handshake::encrypt_side(receiver_public);
    let salt = handshake::generate_salt();
    let key = derive_key(shared.raw_secret_bytes().as_slice(), &salt)?;
    drop(shared);

    let seed = seed_from_key(&key, &salt);
    let channels = image.channels() as usize;
    let permuted = image.with_pixels(permutation::permute(image.pixels(), channels, seed)?)?;

    let encryptor = Encryptor::new(&key)?;
    let aad = packet::shape_bytes(image.height(), image.width(), image.channels());

    let (sealed, metrics) = if with_metrics {
        let (sealed, metrics) = rayon::join(
            || encryptor.encrypt(permuted.pixels(), &aad),
            || metrics::evaluate(image, &permuted),
        );
        (sealed?, Some(metrics))
    } else {
        (encryptor.encrypt(permuted.pixels(), &aad)?, None)
    };

    let packet = Packet {
        height: image.height(),
        width: image.width(),
        channels: image.channels(),
        salt,
        sender_public: ephemeral.encoded_public_key()?,
        nonce: sealed.nonce,
        tag: sealed.tag,
        ciphertext: sealed.ciphertext,
    };
    debug!("Sealed packet: {} byte sender key, {} byte ciphertext", packet.sender_public.len(), packet.ciphertext.len());

    Ok((packet, metrics))
}

/// Parses, authenticates, decrypts and un-permutes a packet addressed to
/// `receiver`. All-or-nothing: any failure returns no pixels.
pub fn open(receiver: &ReceiverKeyPair, packet_bytes: &[u8]) -> Result<Image> {
    let packet = Packet::decode(packet_bytes)?;
    let sender_public = decode_public_key(&packet.sender_public)?;

    let shared = handshake::decrypt_side(&sender_public, receiver.secret_key());
    let key = derive_key(shared.raw_secret_bytes().as_slice(), &packet.salt)?;
    drop(shared);

    let plaintext = Encryptor::new(&key)?
        .decrypt(&packet.nonce, &packet.tag, &packet.ciphertext, &packet.shape_bytes())?;

    let expected = Image::byte_len_for(packet.height, packet.width, packet.channels);
    if packet.channels == 0 || plaintext.len() != expected {
        return Err(ImageCryptoError::DimensionMismatchError(format!(
            "header declares {}x{}x{} ({} bytes) but payload is {} bytes",
            packet.height, packet.width, packet.channels, expected, plaintext.len()
        )));
    }

    let seed = seed_from_key(&key, &packet.salt);
    let pixels = permutation::invert(&plaintext, packet.channels as usize, seed)?;
    debug!("Opened {}x{}x{} image", packet.height, packet.width, packet.channels);
    Image::new(packet.height, packet.width, packet.channels, pixels)
}
