//! Cryptographic constants for the flashlock wire and at-rest formats.
//!
//! These values are normative: the at-rest firmware files, the in-flight
//! artifact blobs, and both ends of the session-key wrap all depend on
//! them. Changing any of them invalidates every provisioned vault.

/// Size of AES-256-GCM nonces in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM authentication tags in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// Size of the `nonce || tag` header preceding every ciphertext.
pub const BLOB_HEADER_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Size of symmetric keys in bytes (256 bits). Used for both the vault
/// master key and per-session keys.
pub const KEY_SIZE: usize = 32;

/// Random bytes drawn for a session identifier (256 bits of entropy).
pub const SESSION_TOKEN_SIZE: usize = 32;

/// Size of the Argon2id salt stored with the protected client key.
pub const KEK_SALT_SIZE: usize = 32;

/// Default session lifetime in seconds (15 minutes).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 900;

/// Minimum accepted RSA modulus size for client keypairs.
pub const MIN_RSA_BITS: usize = 2048;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_nonce_plus_tag() {
        assert_eq!(BLOB_HEADER_SIZE, 28);
        assert_eq!(NONCE_SIZE, 12);
        assert_eq!(TAG_SIZE, 16);
        assert_eq!(KEY_SIZE, 32);
    }
}
