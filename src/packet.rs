//! Wire format for an encrypted image.
//!
//! ```text
//! offset  size           field
//!  0      2              height        (u16 BE)
//!  2      2              width         (u16 BE)
//!  4      2              channels      (u16 BE)
//!  6      16             salt          (HKDF salt)
//! 22      2              sender_pub_len (u16 BE)
//! 24      sender_pub_len sender_pub    (DER SubjectPublicKeyInfo)
//!  ..     12             nonce
//!  ..     16             tag
//!  ..     remainder      ciphertext
//! ```
//!
//! The six shape bytes double as AES-GCM associated data, so they cannot be
//! altered without failing authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::encryption::handshake::SALT_LEN;
use crate::encryption::payload::{NONCE_LEN, TAG_LEN};
use crate::error::{ImageCryptoError, Result};

pub const SHAPE_LEN: usize = 6;
/// Every byte of the packet except the sender key and ciphertext.
pub const FIXED_LEN: usize = SHAPE_LEN + SALT_LEN + 2 + NONCE_LEN + TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub height: u16,
    pub width: u16,
    pub channels: u16,
    pub salt: [u8; SALT_LEN],
    pub sender_public: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl Packet {
    pub fn shape_bytes(&self) -> [u8; SHAPE_LEN] {
        shape_bytes(self.height, self.width, self.channels)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let sender_len = u16::try_from(self.sender_public.len()).map_err(|_| {
            ImageCryptoError::MalformedPacketError(format!(
                "sender public key is {} bytes, limit is {}",
                self.sender_public.len(), u16::MAX
            ))
        })?;

        let mut out = Vec::with_capacity(FIXED_LEN + self.sender_public.len() + self.ciphertext.len());
        out.extend_from_slice(&self.shape_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&sender_len.to_be_bytes());
        out.extend_from_slice(&self.sender_public);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let height = reader.read_u16("height")?;
        let width = reader.read_u16("width")?;
        let channels = reader.read_u16("channels")?;
        let salt = reader.read_array::<SALT_LEN>("salt")?;
        let sender_len = reader.read_u16("sender public key length")? as usize;
        let sender_public = reader.take(sender_len, "sender public key")?.to_vec();
        let nonce = reader.read_array::<NONCE_LEN>("nonce")?;
        let tag = reader.read_array::<TAG_LEN>("tag")?;
        let ciphertext = reader.rest().to_vec();

        Ok(Self {
            height,
            width,
            channels,
            salt,
            sender_public,
            nonce,
            tag,
            ciphertext,
        })
    }

    pub fn encode_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.encode()?))
    }

    pub fn decode_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::decode(&bytes)
    }
}

pub fn shape_bytes(height: u16, width: u16, channels: u16) -> [u8; SHAPE_LEN] {
    let mut out = [0u8; SHAPE_LEN];
    out[0..2].copy_from_slice(&height.to_be_bytes());
    out[2..4].copy_from_slice(&width.to_be_bytes());
    out[4..6].copy_from_slice(&channels.to_be_bytes());
    out
}

/// Bounds-checked cursor; every read reports which field ran short.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ImageCryptoError::MalformedPacketError(format!(
                "{} needs {} bytes at offset {}, only {} remain",
                field, len, self.pos, self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u16(&mut self, field: &str) -> Result<u16> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_array<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}
