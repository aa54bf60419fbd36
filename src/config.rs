use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::error::{ImageCryptoError, Result};

pub const DEFAULT_KEY_DIR: &str = "keys";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `receiver_private.pem` and `receiver_public.pem`.
    pub key_dir: PathBuf,
    /// Replace an unreadable private key with a fresh one instead of failing.
    pub regenerate_on_corrupt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from(DEFAULT_KEY_DIR),
            regenerate_on_corrupt: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load from environment, falling back to defaults
        let key_dir = std::env::var("MEDIMG_KEY_DIR")
            .unwrap_or_else(|_| DEFAULT_KEY_DIR.to_string());
        if key_dir.trim().is_empty() {
            return Err(ImageCryptoError::KeyStorageError(
                "MEDIMG_KEY_DIR is set but empty".to_string()
            ));
        }

        Ok(Self {
            key_dir: PathBuf::from(key_dir),
            regenerate_on_corrupt: std::env::var("MEDIMG_REGENERATE_ON_CORRUPT")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.key_dir, PathBuf::from("keys"));
        assert!(!config.regenerate_on_corrupt);
    }
}
