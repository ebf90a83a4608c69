//! RSA-OAEP session-key wrapping.
//!
//! The server wraps each freshly minted session key under the client's
//! public key; the client unwraps it with the private half held by its
//! key custodian. Both sides use OAEP with SHA-256 for mask generation
//! and label, so the parameters here are the single point of agreement.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::constants::{KEY_SIZE, MIN_RSA_BITS};
use crate::errors::{CryptoError, Result};
use crate::secret::{SecretBytes, SecretKey};

/// Generate a fresh RSA keypair of `bits` modulus size.
///
/// Sizes below [`MIN_RSA_BITS`] are refused outright.
pub fn generate_keypair(bits: usize) -> Result<RsaPrivateKey> {
    if bits < MIN_RSA_BITS {
        return Err(CryptoError::KeyGen(format!(
            "modulus of {bits} bits is below the {MIN_RSA_BITS}-bit minimum"
        )));
    }
    RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))
}

/// Wrap a 32-byte session key under `public` with OAEP-SHA256.
///
/// The wrapped form is safe to copy and transmit.
pub fn wrap_key(public: &RsaPublicKey, key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    public
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), key.as_slice())
        .map_err(|_| CryptoError::Wrap)
}

/// Unwrap a session key with the private half of the client keypair.
///
/// Anything that does not decrypt to exactly 32 bytes is an unwrap
/// failure; the partial plaintext is zeroed before the error surfaces.
pub fn unwrap_key(private: &RsaPrivateKey, wrapped: &[u8]) -> Result<SecretKey> {
    let mut plaintext = private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| CryptoError::Unwrap)?;

    let key = SecretKey::from_slice(&plaintext).map_err(|_| CryptoError::Unwrap);
    plaintext.zeroize();
    key
}

/// Serialize a public key as SPKI PEM for transmission to the server.
pub fn public_key_to_pem(public: &RsaPublicKey) -> Result<String> {
    public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::PublicKey(e.to_string()))
}

/// Parse a public key from PEM, accepting SPKI with a PKCS#1 fallback.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    let pem = pem.trim_start_matches('\u{feff}').trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::PublicKey(e.to_string()))
}

/// Serialize a private key as PKCS#8 DER inside a zeroizing buffer.
pub fn private_key_to_der(private: &RsaPrivateKey) -> Result<SecretBytes> {
    let document = private
        .to_pkcs8_der()
        .map_err(|_| CryptoError::PrivateKey)?;
    Ok(SecretBytes::new(document.as_bytes().to_vec()))
}

/// Parse a private key from PKCS#8 DER.
pub fn private_key_from_der(der: &[u8]) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(der).map_err(|_| CryptoError::PrivateKey)
}
