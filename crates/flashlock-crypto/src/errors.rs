//! Error types for the shared cryptographic primitives.

/// Errors produced by the flashlock crypto primitives.
///
/// Authentication failures deliberately carry no detail beyond the fact
/// of the failure; callers translate them into their own domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Authenticated decryption failed. No plaintext was produced.
    #[error("ciphertext failed authentication")]
    Integrity,

    /// The blob is too short to contain the `nonce || tag` header and a
    /// non-empty ciphertext.
    #[error("encrypted blob truncated ({0} bytes)")]
    Truncated(usize),

    /// Symmetric encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// A key had the wrong length for the requested operation.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    KeyLength {
        /// The length the operation requires.
        expected: usize,
        /// The length that was supplied.
        got: usize,
    },

    /// Asymmetric wrapping of a session key failed.
    #[error("session key wrap failed")]
    Wrap,

    /// Asymmetric unwrapping of a session key failed.
    #[error("session key unwrap failed")]
    Unwrap,

    /// A public key could not be parsed or serialized.
    #[error("invalid public key encoding: {0}")]
    PublicKey(String),

    /// A private key could not be parsed or serialized.
    #[error("invalid private key encoding")]
    PrivateKey,

    /// Key generation or derivation failed.
    #[error("key generation failed: {0}")]
    KeyGen(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CryptoError>;
