//! Seeded pixel-position permutation
//!
//! The shuffle must be bit-identical on every platform and in every
//! implementation that reads these packets, so the algorithm is pinned:
//!
//! 1. RNG: ChaCha20 (`rand_chacha::ChaCha20Rng`) created with
//!    `seed_from_u64(seed as u64)`, i.e. the 32-byte ChaCha key is expanded
//!    from the seed with rand_core's PCG32 routine; stream 0, counter 0.
//! 2. Start from the identity `perm = [0, 1, .., N-1]`.
//! 3. For `i` from `N-1` down to `1`, draw `j` uniform in `[0, i]`: take
//!    `r = next_u64()`, reject while `r >= 2^64 - (2^64 mod (i+1))`, then
//!    `j = r mod (i+1)`. Swap `perm[i]` and `perm[j]`.
//!
//! Applying: `permuted[k] = original[perm[k]]`, a pixel's channel bytes
//! moving together. Inverting: `original[perm[k]] = permuted[k]`.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};

use super::handshake::DerivedKey;
use crate::error::{ImageCryptoError, Result};

/// First four bytes of SHA-256(key ‖ salt), big-endian.
pub fn seed_from_key(key: &DerivedKey, salt: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(salt);
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelPermutation {
    order: Vec<usize>,
}

impl PixelPermutation {
    pub fn generate(len: usize, seed: u32) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        if len <= 1 {
            return Self { order };
        }

        let mut rng = ChaCha20Rng::seed_from_u64(u64::from(seed));
        for i in (1..len).rev() {
            let j = uniform_below(&mut rng, i as u64 + 1) as usize;
            order.swap(i, j);
        }

        Self { order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    pub fn apply(&self, pixels: &[u8], channels: usize) -> Result<Vec<u8>> {
        self.check_len(pixels.len(), channels)?;

        let mut permuted = Vec::with_capacity(pixels.len());
        for &src in &self.order {
            permuted.extend_from_slice(&pixels[src * channels..(src + 1) * channels]);
        }
        Ok(permuted)
    }

    pub fn invert(&self, permuted: &[u8], channels: usize) -> Result<Vec<u8>> {
        self.check_len(permuted.len(), channels)?;

        let mut original = vec![0u8; permuted.len()];
        for (&dst, src) in self.order.iter().zip(permuted.chunks_exact(channels)) {
            original[dst * channels..(dst + 1) * channels].copy_from_slice(src);
        }
        Ok(original)
    }

    fn check_len(&self, byte_len: usize, channels: usize) -> Result<()> {
        if channels == 0 {
            return Err(ImageCryptoError::DimensionMismatchError(
                "channel count must be at least 1".to_string()
            ));
        }
        if byte_len != self.order.len() * channels {
            return Err(ImageCryptoError::DimensionMismatchError(format!(
                "permutation covers {} pixels of {} bytes, buffer has {} bytes",
                self.order.len(), channels, byte_len
            )));
        }
        Ok(())
    }
}

/// Scrambles `pixels` (a whole number of `channels`-byte pixels).
pub fn permute(pixels: &[u8], channels: usize, seed: u32) -> Result<Vec<u8>> {
    let pixel_count = pixel_count(pixels.len(), channels)?;
    PixelPermutation::generate(pixel_count, seed).apply(pixels, channels)
}

/// Exact inverse of [`permute`] for the same seed and channel count.
pub fn invert(permuted: &[u8], channels: usize, seed: u32) -> Result<Vec<u8>> {
    let pixel_count = pixel_count(permuted.len(), channels)?;
    PixelPermutation::generate(pixel_count, seed).invert(permuted, channels)
}

fn pixel_count(byte_len: usize, channels: usize) -> Result<usize> {
    if channels == 0 || byte_len % channels != 0 {
        return Err(ImageCryptoError::DimensionMismatchError(format!(
            "{} bytes is not a whole number of {}-byte pixels",
            byte_len, channels
        )));
    }
    Ok(byte_len / channels)
}

/// Unbiased draw from `[0, bound)` by rejection sampling on 64-bit words.
fn uniform_below(rng: &mut ChaCha20Rng, bound: u64) -> u64 {
    debug_assert!(bound > 0);
    // 2^64 mod bound, computed without overflowing u64
    let remainder = (u64::MAX % bound + 1) % bound;
    let zone = u64::MAX - remainder;
    loop {
        let r = rng.next_u64();
        if remainder == 0 || r <= zone {
            return r % bound;
        }
    }
}
