//! # flashlock-client
//!
//! The client half of the one-time firmware delivery system: derives the
//! hardware fingerprint, custodians the long-lived keypair, pulls and
//! decrypts session-bound firmware entirely through memory, drives the
//! native flash tool, and destroys every trace afterwards.

pub mod agent;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hwid;
pub mod http;
pub mod keystore;
pub mod progress;
pub mod tool;

pub use agent::{FlashAgent, FlashOutcome};
pub use cancel::CancelToken;
pub use config::ClientConfig;
pub use error::FlashError;
pub use progress::{FlashPhase, NullSink, ProgressEvent, ProgressSink, StderrSink};
