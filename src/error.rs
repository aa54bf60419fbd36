use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageCryptoError>;

#[derive(Error, Debug)]
pub enum ImageCryptoError {
    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Key load error: {0}")]
    KeyLoadError(String),

    #[error("Key storage error: {0}")]
    KeyStorageError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacketError(String),

    #[error("Authentication failed: packet was tampered with or sent to a different receiver")]
    AuthenticationError,

    #[error("Dimension mismatch: {0}")]
    DimensionMismatchError(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),
}

impl From<std::io::Error> for ImageCryptoError {
    fn from(err: std::io::Error) -> Self {
        ImageCryptoError::KeyStorageError(err.to_string())
    }
}

impl From<image::ImageError> for ImageCryptoError {
    fn from(err: image::ImageError) -> Self {
        ImageCryptoError::DecodeError(err.to_string())
    }
}

impl From<base64::DecodeError> for ImageCryptoError {
    fn from(err: base64::DecodeError) -> Self {
        ImageCryptoError::MalformedPacketError(format!("invalid base64: {}", err))
    }
}
