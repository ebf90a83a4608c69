//! Common utility functions for flashlock cryptographic operations.

use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::SESSION_TOKEN_SIZE;

/// Returns the current Unix timestamp in seconds.
///
/// This is the single source of truth for timestamp generation across
/// the flashlock system.
///
/// # Panics
///
/// Panics if the system time is set before the Unix epoch (January 1,
/// 1970). This is extremely unlikely in production but can happen if the
/// system clock is misconfigured.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before Unix epoch")
        .as_secs()
}

/// Generate cryptographically secure random bytes.
///
/// Uses the system's CSPRNG to fill a fixed-size array with random
/// bytes.
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Base64url encode data without padding.
pub fn base64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Standard base64 encode (used for wrapped session keys on the wire).
pub fn base64_std_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Standard base64 decode.
pub fn base64_std_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// Draw a fresh session identifier: 256 bits from the CSPRNG, encoded
/// base64url without padding. Collisions are statistically impossible,
/// and the encoding is safe in URLs and log fields.
pub fn new_session_token() -> String {
    base64_url_encode(&generate_random_bytes::<SESSION_TOKEN_SIZE>())
}

/// SHA-256 of `input`, as uppercase hex. Used for hardware
/// fingerprints and tool binary digests.
pub fn sha256_hex_upper(input: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(input))
}

/// Truncated hash of a sensitive identifier, for log fields.
///
/// Fingerprints and session identifiers never appear in logs in full;
/// eight hash bytes are enough to correlate log lines.
pub fn hash_for_log(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..8])
}
