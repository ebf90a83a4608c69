//! Zeroizing wrappers for transient secrets.
//!
//! Session keys, unwrapped key material, and decrypted firmware all move
//! through these types so that panics and early returns cannot leave
//! plaintext behind in freed memory. `Debug` output never reveals
//! contents.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::KEY_SIZE;
use crate::errors::CryptoError;

/// A heap buffer that is overwritten with zeros when dropped.
///
/// Used for decrypted firmware artifacts and serialized private keys.
/// The buffer is intentionally not `Clone`: ownership moves with the
/// plaintext, and there is exactly one copy to destroy.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Take ownership of `bytes`, zeroizing them on drop.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Length of the protected buffer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the protected bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED]; {} bytes)", self.0.len())
    }
}

/// A 256-bit symmetric key that is overwritten with zeros when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// An all-zero key, used as the replacement value when a live key is
    /// moved out of a longer-lived structure.
    pub fn zeroed() -> Self {
        Self([0u8; KEY_SIZE])
    }

    /// Wrap a slice, rejecting anything that is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::KeyLength {
                expected: KEY_SIZE,
                got: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Overwrite the key in place. Dropping does this too; explicit
    /// calls exist for the points where the protocol requires the key to
    /// be dead before the owning object is released.
    pub fn wipe(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_bytes_debug_redacts_contents() {
        let secret = SecretBytes::new(b"super secret firmware".to_vec());
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super secret"));
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("21 bytes"));
    }

    #[test]
    fn test_secret_key_from_slice_rejects_bad_lengths() {
        assert!(SecretKey::from_slice(&[0u8; 31]).is_err());
        assert!(SecretKey::from_slice(&[0u8; 33]).is_err());
        assert!(SecretKey::from_slice(&[7u8; 32]).is_ok());
    }

    #[test]
    fn test_secret_key_wipe_overwrites() {
        let mut key = SecretKey::new([0xAAu8; 32]);
        key.wipe();
        assert_eq!(key.as_bytes(), &[0u8; 32]);
    }
}
