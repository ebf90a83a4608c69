//! The authenticated-encryption codec shared by both halves of the
//! system.
//!
//! One framing serves two purposes: firmware encrypted at rest under the
//! vault master key, and artifacts re-encrypted in flight under a
//! session key. The layout is always
//!
//! ```text
//! nonce(12) || tag(16) || ciphertext(N)
//! ```
//!
//! with AES-256-GCM. The nonce is freshly sampled for every seal, so a
//! key is never paired with a repeated nonce by this module.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use crate::constants::{BLOB_HEADER_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::errors::{CryptoError, Result};
use crate::secret::SecretBytes;

/// Encrypt `plaintext` under `key` with a freshly sampled nonce.
///
/// Returns the full `nonce || tag || ciphertext` blob. The ciphertext
/// scratch produced by the cipher is zeroed before returning.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyLength {
        expected: KEY_SIZE,
        got: key.len(),
    })?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    // aes-gcm appends the tag to the ciphertext; the wire format wants
    // the tag up front so the header has a fixed length.
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    let split = sealed.len() - TAG_SIZE;

    let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed[split..]);
    blob.extend_from_slice(&sealed[..split]);

    sealed.zeroize();
    nonce.zeroize();
    Ok(blob)
}

/// Authenticate and decrypt a `nonce || tag || ciphertext` blob.
///
/// Fails wholesale: either the complete plaintext is returned, or no
/// plaintext at all. A blob of exactly header length carries no
/// ciphertext and is rejected as truncated. Intermediate buffers are
/// zeroed on every exit path.
pub fn open(key: &[u8; KEY_SIZE], blob: &[u8]) -> Result<SecretBytes> {
    if blob.len() <= BLOB_HEADER_SIZE {
        return Err(CryptoError::Truncated(blob.len()));
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyLength {
        expected: KEY_SIZE,
        got: key.len(),
    })?;

    let (nonce, rest) = blob.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    // Reassemble into the ciphertext || tag order the cipher expects.
    let mut joined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    joined.extend_from_slice(ciphertext);
    joined.extend_from_slice(tag);

    let result = cipher.decrypt(Nonce::from_slice(nonce), joined.as_slice());
    joined.zeroize();

    match result {
        Ok(plaintext) => Ok(SecretBytes::new(plaintext)),
        Err(_) => Err(CryptoError::Integrity),
    }
}
