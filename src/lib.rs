pub mod cipher;
pub mod config;
pub mod encryption;
pub mod error;
pub mod image_io;
pub mod packet;
pub mod types;

pub use cipher::{open, seal, seal_with_metrics, EncryptedImage, EncryptionReport, ImageCipher};
pub use config::Config;
pub use encryption::{CorruptKeyPolicy, IdentityStore, Metrics, ReceiverKeyPair};
pub use error::{ImageCryptoError, Result};
pub use packet::Packet;
pub use types::Image;
