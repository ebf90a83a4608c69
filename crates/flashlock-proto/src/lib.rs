//! Wire types for the one-time flash session protocol.
//!
//! Four resources live under `/api/flash`:
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | POST | `/sessions` | [`CreateSessionRequest`] |
//! | GET  | `/sessions/{id}?hwid=…` | — |
//! | GET  | `/sessions/{id}/firmware/{name}?hwid=…` | — |
//! | POST | `/sessions/{id}/complete` | [`CompleteRequest`] |
//!
//! The field casing below is part of the protocol; both halves of the
//! system depend on this crate so the names can never drift apart.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Body of `POST /api/flash/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Hardware fingerprint the session will be bound to.
    #[serde(rename = "HWID")]
    pub hwid: String,
    /// Device type identifier from the closed catalog.
    #[serde(rename = "DeviceType")]
    pub device_type: String,
    /// Client public key (SPKI PEM) the session key is wrapped under.
    #[serde(rename = "ClientPublicKeyPem")]
    pub client_public_key_pem: String,
}

/// Session object returned by create and read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    #[serde(rename = "SessionId")]
    pub session_id: String,
    /// The session key wrapped under the client public key, base64.
    /// Read returns the wrap exactly as issued at create.
    #[serde(rename = "WrappedSessionKeyBase64")]
    pub wrapped_session_key_base64: String,
    /// Expiration instant, ISO-8601 UTC.
    #[serde(rename = "ExpiresAt")]
    pub expires_at: String,
    #[serde(rename = "Status")]
    pub status: SessionStatus,
    /// Ordered artifact manifest for the bound device type.
    #[serde(rename = "FirmwareFiles")]
    pub firmware_files: Vec<String>,
    #[serde(rename = "CreditCost")]
    pub credit_cost: u32,
}

/// Query string for reads and artifact fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwidQuery {
    pub hwid: String,
}

/// Body of `POST /api/flash/sessions/{id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    #[serde(rename = "HWID")]
    pub hwid: String,
    /// Whether the flash tool reported success.
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMessage", skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

/// Response to a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// Whether the completion was accepted (false for sessions already
    /// in a terminal state).
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "CreditsDeducted")]
    pub credits_deducted: bool,
}

/// JSON error body accompanying every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Lifecycle state of a flash session.
///
/// `Active` is the only state in which artifacts may be fetched.
/// Completed and Failed are transitional: a session that reaches either
/// is burned in the same operation, so observers see `Burned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Expired,
    Burned,
}

impl SessionStatus {
    /// Whether this status permits any further artifact downloads.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Burned
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Active => "Active",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
            SessionStatus::Expired => "Expired",
            SessionStatus::Burned => "Burned",
        };
        f.write_str(name)
    }
}
