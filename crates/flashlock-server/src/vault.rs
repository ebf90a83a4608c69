//! The firmware vault: encrypted-at-rest artifact storage.
//!
//! Every artifact lives on disk as `<name>.enc`, framed
//! `nonce(12) || tag(16) || ciphertext` under the master key. The vault
//! decrypts into memory only; plaintext never touches stable storage on
//! this side of the trust boundary.

use flashlock_crypto::{aead, CryptoError, SecretBytes, SecretKey};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::catalog::{DeviceCatalog, DeviceProfile};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("firmware artifact not found: {0}")]
    NotFound(String),

    #[error("firmware artifact failed integrity check: {0}")]
    Integrity(String),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("i/o failure reading artifact {name}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct Vault {
    storage_dir: PathBuf,
    master_key: SecretKey,
    catalog: DeviceCatalog,
}

impl Vault {
    /// Take ownership of the master key. The vault is the only
    /// long-term holder; everything else borrows through
    /// [`Vault::open_plaintext`].
    pub fn new(storage_dir: PathBuf, master_key: SecretKey, catalog: DeviceCatalog) -> Self {
        Self {
            storage_dir,
            master_key,
            catalog,
        }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn profile(&self, device_type: &str) -> Result<&DeviceProfile, VaultError> {
        self.catalog
            .profile(device_type)
            .ok_or_else(|| VaultError::UnknownDeviceType(device_type.to_string()))
    }

    /// Ordered artifact manifest for a device type.
    pub fn required_artifacts(&self, device_type: &str) -> Result<&[String], VaultError> {
        Ok(&self.profile(device_type)?.artifacts)
    }

    /// Whether every ciphertext file for the device type exists on disk.
    /// Presence only; integrity is checked lazily at open time.
    pub fn all_present(&self, device_type: &str) -> Result<bool, VaultError> {
        for name in self.required_artifacts(device_type)? {
            if !self.artifact_path(name)?.is_file() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read, authenticate, and decrypt one artifact into memory.
    ///
    /// The returned buffer is moved to the caller, who owns its
    /// zeroization (the wrapper does it on drop). On authentication
    /// failure nothing is surfaced.
    pub fn open_plaintext(&self, name: &str) -> Result<SecretBytes, VaultError> {
        let path = self.artifact_path(name)?;
        let mut blob = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(name.to_string())
            } else {
                VaultError::Io {
                    name: name.to_string(),
                    source,
                }
            }
        })?;

        let result = aead::open(self.master_key.as_bytes(), &blob);
        blob.zeroize();

        result.map_err(|e| match e {
            CryptoError::Integrity | CryptoError::Truncated(_) => {
                VaultError::Integrity(name.to_string())
            }
            other => VaultError::Io {
                name: name.to_string(),
                source: std::io::Error::other(other.to_string()),
            },
        })
    }

    /// Resolve `<storage_dir>/<name>.enc`, refusing names that could
    /// escape the storage directory.
    fn artifact_path(&self, name: &str) -> Result<PathBuf, VaultError> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(VaultError::InvalidName(name.to_string()));
        }
        Ok(self.storage_dir.join(format!("{name}.enc")))
    }
}

/// Encrypt and write one artifact. This is the provisioning-side helper
/// used by operators and tests; the serving path never writes.
pub fn provision_artifact(
    storage_dir: &Path,
    master_key: &SecretKey,
    name: &str,
    plaintext: &[u8],
) -> Result<(), VaultError> {
    let blob = aead::seal(master_key.as_bytes(), plaintext).map_err(|e| VaultError::Io {
        name: name.to_string(),
        source: std::io::Error::other(e.to_string()),
    })?;
    std::fs::write(storage_dir.join(format!("{name}.enc")), blob).map_err(|source| {
        VaultError::Io {
            name: name.to_string(),
            source,
        }
    })
}
