//! Receiver identity management
//!
//! The receiver holds one long-lived P-256 key pair, persisted as a PKCS#8
//! private key and an SPKI public key, both PEM. It is loaded once at startup
//! and shared read-only by every encrypt/decrypt call.

use log::{debug, info, warn};
use p256::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    PublicKey, SecretKey,
};
use parking_lot::Mutex;
use rand_core::OsRng;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

use super::random_bytes;
use crate::config::Config;
use crate::error::{ImageCryptoError, Result};

pub const PRIVATE_KEY_FILE: &str = "receiver_private.pem";
pub const PUBLIC_KEY_FILE: &str = "receiver_public.pem";

#[derive(Clone)]
pub struct ReceiverKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl ReceiverKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key_pem(&self) -> Result<String> {
        self.public.to_public_key_pem(LineEnding::LF)
            .map_err(|e| ImageCryptoError::KeyStorageError(format!("public key encoding failed: {}", e)))
    }
}

impl fmt::Debug for ReceiverKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// What `load` does when the persisted private key cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptKeyPolicy {
    /// Report `KeyLoadError`. Regenerating would orphan every packet
    /// already encrypted to the old key.
    Fail,
    /// Log a warning and replace the key pair.
    Regenerate,
}

/// Loads and persists the receiver key pair.
///
/// Generation is serialized twice: a mutex for callers sharing one store,
/// and a lock file in the key directory for separate stores and processes
/// pointed at the same files.
pub struct IdentityStore {
    key_dir: PathBuf,
    policy: CorruptKeyPolicy,
    generation_lock: Mutex<()>,
}

impl IdentityStore {
    pub fn new(key_dir: impl Into<PathBuf>, policy: CorruptKeyPolicy) -> Self {
        Self {
            key_dir: key_dir.into(),
            policy,
            generation_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let policy = if config.regenerate_on_corrupt {
            CorruptKeyPolicy::Regenerate
        } else {
            CorruptKeyPolicy::Fail
        };
        Self::new(config.key_dir.clone(), policy)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.key_dir.join(PRIVATE_KEY_FILE)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.key_dir.join(PUBLIC_KEY_FILE)
    }

    /// Returns the persisted key pair, generating one if none exists.
    pub fn load(&self) -> Result<ReceiverKeyPair> {
        let _guard = self.generation_lock.lock();
        let _dir_lock = DirLock::acquire(&self.key_dir)?;

        let private_path = self.private_key_path();
        let contents = match fs::read(&private_path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No receiver key found in {}, generating a new one", self.key_dir.display());
                return self.generate_unlocked();
            }
            Err(e) => return Err(e.into()),
        };

        let secret = match parse_private_key(&contents) {
            Ok(secret) => secret,
            Err(reason) => match self.policy {
                CorruptKeyPolicy::Fail => {
                    return Err(ImageCryptoError::KeyLoadError(format!(
                        "{}: {}", private_path.display(), reason
                    )));
                }
                CorruptKeyPolicy::Regenerate => {
                    warn!(
                        "Receiver key at {} is unreadable ({}); regenerating. \
                         Packets encrypted to the previous key can no longer be decrypted",
                        private_path.display(), reason
                    );
                    return self.generate_unlocked();
                }
            },
        };

        let pair = ReceiverKeyPair::from_secret(secret);
        self.sync_public_key(&pair)?;
        info!("✓ Receiver key loaded from {}", private_path.display());
        Ok(pair)
    }

    /// Creates and persists a new key pair, replacing any existing one.
    pub fn generate(&self) -> Result<ReceiverKeyPair> {
        let _guard = self.generation_lock.lock();
        let _dir_lock = DirLock::acquire(&self.key_dir)?;
        self.generate_unlocked()
    }

    /// Caller must hold both locks.
    fn generate_unlocked(&self) -> Result<ReceiverKeyPair> {
        let pair = ReceiverKeyPair::generate();
        let private_pem = pair.secret.to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| ImageCryptoError::KeyStorageError(format!("private key encoding failed: {}", e)))?;

        write_atomically(&self.private_key_path(), private_pem.as_bytes(), true)?;
        write_atomically(&self.public_key_path(), pair.public_key_pem()?.as_bytes(), false)?;

        info!("✓ Generated new receiver key pair in {}", self.key_dir.display());
        Ok(pair)
    }

    /// Rewrites the public key file if it is missing or does not belong to
    /// the private key.
    fn sync_public_key(&self, pair: &ReceiverKeyPair) -> Result<()> {
        let public_path = self.public_key_path();
        let matches = fs::read_to_string(&public_path)
            .ok()
            .and_then(|pem| PublicKey::from_public_key_pem(&pem).ok())
            .map(|public| public == pair.public)
            .unwrap_or(false);

        if !matches {
            warn!("Public key at {} missing or stale, rewriting it", public_path.display());
            write_atomically(&public_path, pair.public_key_pem()?.as_bytes(), false)?;
        }
        Ok(())
    }
}

/// Any content that is not a PKCS#8 PEM P-256 key, including bytes that
/// are not text at all.
fn parse_private_key(contents: &[u8]) -> std::result::Result<SecretKey, String> {
    let pem = std::str::from_utf8(contents)
        .map_err(|e| format!("not a PEM document: {}", e))?;
    SecretKey::from_pkcs8_pem(pem).map_err(|e| e.to_string())
}

const LOCK_FILE: &str = ".receiver.lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(10);
/// A lock file older than this is assumed to belong to a crashed process.
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

/// Exclusive lock on a key directory, held while the lock file exists.
struct DirLock {
    path: PathBuf,
}

impl DirLock {
    fn acquire(key_dir: &Path) -> Result<Self> {
        fs::create_dir_all(key_dir)?;
        let path = key_dir.join(LOCK_FILE);
        let start = Instant::now();

        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Owner pid, for whoever finds a leftover lock
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!("Acquired {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!("Removing stale key directory lock {}", path.display());
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(ImageCryptoError::KeyStorageError(format!(
                            "timed out after {:?} waiting for {}",
                            LOCK_TIMEOUT, path.display()
                        )));
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}

/// Writes through a freshly created, uniquely named temp file and renames it
/// over `path`. The temp file never pre-exists, so the 0600 mode of a
/// private key applies from creation.
fn write_atomically(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let suffix: String = random_bytes::<8>().iter().map(|b| format!("{:02x}", b)).collect();
    let tmp_path = path.with_extension(format!("pem.tmp.{}", suffix));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let result = options.open(&tmp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.map_err(ImageCryptoError::from)
}
