//! # flashlock-crypto
//!
//! Cryptographic primitives shared by the flashlock server and client.
//!
//! Both halves of the system speak the same authenticated-encryption
//! framing (`nonce || tag || ciphertext`), wrap session keys with
//! RSA-OAEP-SHA256, and route every transient secret through the
//! zeroizing wrapper types in [`secret`]. Keeping all of that in one
//! crate is what guarantees the at-rest firmware format and the
//! in-flight artifact format stay parseable by a single codec.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod constants;
pub mod errors;
pub mod secret;
pub mod utils;
pub mod wrap;

pub use aead::{open, seal};
pub use constants::*;
pub use errors::CryptoError;
pub use secret::{SecretBytes, SecretKey};
pub use utils::*;
pub use wrap::{
    generate_keypair, private_key_from_der, private_key_to_der, public_key_from_pem,
    public_key_to_pem, unwrap_key, wrap_key,
};
