//! API error type and its mapping onto HTTP status codes.
//!
//! The mapping is part of the protocol: 400 for malformed requests,
//! unknown device types, unprovisioned firmware, and unusable sessions;
//! 404 for unknown sessions *and* fingerprint mismatches (deliberately
//! conflated so the endpoint is not an oracle); 500 for everything
//! internal. Error bodies never carry key material or fingerprints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use flashlock_proto::ErrorBody;

use crate::sessions::SessionError;
use crate::vault::VaultError;

#[derive(Debug)]
pub enum ApiError {
    /// 400 with a caller-visible reason.
    InvalidRequest(String),
    /// 404; the body says "session not found" no matter why.
    NotFound,
    /// 500 for an artifact failing authenticated decryption. The body
    /// names the condition so the client can report it as the flash
    /// failure reason.
    IntegrityFailure(String),
    /// 500; the body is generic, the detail goes to the log only.
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "session not found".to_string()),
            ApiError::IntegrityFailure(name) => {
                tracing::error!(artifact = %name, "Artifact failed integrity check");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("artifact {name} failed integrity check"),
                )
            }
            ApiError::Internal(error) => {
                tracing::error!(error = %error, "Internal error serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::UnknownDeviceType(_)
            | SessionError::FirmwareUnavailable(_)
            | SessionError::InvalidInput(_)
            | SessionError::PublicKey(_) => ApiError::InvalidRequest(error.to_string()),
            SessionError::Unusable(status) => {
                ApiError::InvalidRequest(format!("session is not usable: {status}"))
            }
            SessionError::NotFound => ApiError::NotFound,
            SessionError::Internal(detail) => ApiError::Internal(anyhow::anyhow!(detail)),
        }
    }
}

/// Vault errors surfacing from the artifact fetch path. Session create
/// maps firmware availability itself, so only the fetch cases appear
/// here.
impl From<VaultError> for ApiError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::NotFound(_) => ApiError::NotFound,
            VaultError::InvalidName(name) => {
                ApiError::InvalidRequest(format!("invalid artifact name: {name}"))
            }
            VaultError::Integrity(name) => ApiError::IntegrityFailure(name),
            other => ApiError::Internal(anyhow::anyhow!(other)),
        }
    }
}
