//! Encryption module for securing medical images
//!
//! Per message the sender generates an ephemeral P-256 key, agrees on a
//! secret with the receiver's static key, derives an AES-256 key with HKDF,
//! scrambles pixel positions with a permutation seeded from that key and
//! seals the scrambled bytes with AES-GCM.

pub mod handshake;
pub mod keys;
pub mod metrics;
pub mod payload;
pub mod permutation;

use rand::Rng;

pub use self::handshake::{DerivedKey, EphemeralKeyPair};
pub use self::keys::{CorruptKeyPolicy, IdentityStore, ReceiverKeyPair};
pub use self::metrics::Metrics;
pub use self::payload::{Encryptor, SealedPayload};
pub use self::permutation::PixelPermutation;

/// Fills a fixed-size array from the thread-local CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; N];
    rng.fill(&mut bytes[..]);
    bytes
}
