//! Client key custodian.
//!
//! Owns the long-lived RSA keypair whose public half is sent with every
//! session create and whose private half unwraps session keys. The
//! private key is persisted only as authenticated ciphertext in
//! `client_key.dat`; the key-encryption key is derived per user from an
//! Argon2id stretch of user- and machine-bound inputs, so the blob is
//! useless off this installation. Plaintext key material exists only in
//! process memory guarded by this module.

use rsa::RsaPrivateKey;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use flashlock_crypto::{
    aead, generate_keypair, private_key_from_der, private_key_to_der, public_key_to_pem,
    unwrap_key, SecretKey, KEK_SALT_SIZE,
};

use crate::error::FlashError;
use crate::hwid;

/// Domain separation for the client key KEK derivation.
const KEK_DOMAIN: &str = "flashlock:client-key:v1";

/// Argon2id parameters for KEK derivation.
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

const KEY_FILE_NAME: &str = "client_key.dat";

#[derive(Debug)]
pub struct KeyCustodian {
    private_key: RsaPrivateKey,
    public_pem: String,
}

impl KeyCustodian {
    /// Load the stored keypair, or create and persist one on first use.
    pub fn ensure(data_dir: &Path, key_bits: usize) -> Result<Self, FlashError> {
        let path = data_dir.join(KEY_FILE_NAME);
        let private_key = if path.is_file() {
            load_private_key(&path)?
        } else {
            create_private_key(data_dir, &path, key_bits)?
        };

        let public_pem = public_key_to_pem(&private_key.to_public_key())
            .map_err(|e| FlashError::Keystore(e.to_string()))?;

        Ok(Self {
            private_key,
            public_pem,
        })
    }

    /// The public half, SPKI PEM, ready for the wire.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Unwrap a session key the server wrapped under our public half.
    pub fn unwrap(&self, wrapped: &[u8]) -> Result<SecretKey, FlashError> {
        unwrap_key(&self.private_key, wrapped).map_err(|_| FlashError::Wrap)
    }
}

/// Derive the key-encryption key for the stored blob. User name and
/// hardware fingerprint stand in for OS user-scoped data protection:
/// the same user on the same hardware re-derives the same KEK, anyone
/// else derives garbage.
fn derive_kek(salt: &[u8]) -> Result<SecretKey, FlashError> {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| FlashError::Keystore(format!("Invalid Argon2 parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut binding = format!(
        "{KEK_DOMAIN}\u{1f}{}\u{1f}{}",
        user_name(),
        hwid::fingerprint()
    );

    let mut kek = [0u8; 32];
    let derived = argon2
        .hash_password_into(binding.as_bytes(), salt, &mut kek)
        .map_err(|e| FlashError::Keystore(format!("Argon2id key derivation failed: {e}")));
    binding.zeroize();
    derived?;

    Ok(SecretKey::new(kek))
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

fn load_private_key(path: &Path) -> Result<RsaPrivateKey, FlashError> {
    let blob = std::fs::read(path)?;
    if blob.len() <= KEK_SALT_SIZE {
        return Err(FlashError::Keystore(format!(
            "protected key file {} is truncated",
            path.display()
        )));
    }
    let (salt, sealed) = blob.split_at(KEK_SALT_SIZE);

    let kek = derive_kek(salt)?;
    let der = aead::open(kek.as_bytes(), sealed).map_err(|_| {
        FlashError::Keystore(
            "failed to unseal client key; was it created by a different user or host?"
                .to_string(),
        )
    })?;

    let private_key = private_key_from_der(der.as_slice())
        .map_err(|e| FlashError::Keystore(e.to_string()))?;
    Ok(private_key)
}

fn create_private_key(
    data_dir: &Path,
    path: &Path,
    key_bits: usize,
) -> Result<RsaPrivateKey, FlashError> {
    tracing::info!(bits = key_bits, "Generating client keypair (first use)");
    let private_key =
        generate_keypair(key_bits).map_err(|e| FlashError::Keystore(e.to_string()))?;

    let mut salt = [0u8; KEK_SALT_SIZE];
    getrandom::getrandom(&mut salt)
        .map_err(|e| FlashError::Keystore(format!("Failed to generate salt: {e}")))?;

    let kek = derive_kek(&salt)?;
    let der = private_key_to_der(&private_key).map_err(|e| FlashError::Keystore(e.to_string()))?;
    let sealed = aead::seal(kek.as_bytes(), der.as_slice())
        .map_err(|e| FlashError::Keystore(e.to_string()))?;
    drop(der);

    let mut blob = Vec::with_capacity(KEK_SALT_SIZE + sealed.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&sealed);

    std::fs::create_dir_all(data_dir)?;
    write_private_file(path, &blob)?;

    tracing::info!(path = %path.display(), "Client keypair persisted");
    Ok(private_key)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Path of the protected key file inside `data_dir`.
pub fn key_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(KEY_FILE_NAME)
}
