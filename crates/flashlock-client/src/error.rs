//! Client-side error taxonomy.
//!
//! The flash agent recovers from nothing: every error below ends the
//! flash, triggers a best-effort completion call with `success=false`,
//! and zeroizes whatever transient material exists. What varies is only
//! the reason string reported to the server.

#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),

    /// The server answered 400; the message is its error body.
    #[error("server rejected request: {0}")]
    Rejected(String),

    /// Unknown session or fingerprint mismatch; the server keeps the
    /// two indistinguishable and so do we.
    #[error("session not found or hardware mismatch")]
    SessionNotFound,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to unwrap session key")]
    Wrap,

    #[error("artifact failed integrity check: {0}")]
    Integrity(String),

    #[error("flash tool not found: {0}")]
    ToolMissing(String),

    #[error("flash tool rejected by integrity check: {0}")]
    ToolUntrusted(String),

    #[error("argument template references unknown artifact: {0}")]
    Template(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("key custodian failure: {0}")]
    Keystore(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FlashError {
    fn from(error: reqwest::Error) -> Self {
        FlashError::Transport(error.to_string())
    }
}

impl FlashError {
    /// The reason string reported to the server when this error aborts
    /// a flash.
    pub fn completion_reason(&self) -> String {
        match self {
            FlashError::Cancelled => "cancelled".to_string(),
            FlashError::Integrity(_) => "integrity".to_string(),
            FlashError::Wrap => "session key unwrap failed".to_string(),
            FlashError::ToolMissing(_) => "flash tool missing".to_string(),
            FlashError::ToolUntrusted(_) => "flash tool untrusted".to_string(),
            FlashError::Transport(_) => "transport failure".to_string(),
            other => other.to_string(),
        }
    }
}
