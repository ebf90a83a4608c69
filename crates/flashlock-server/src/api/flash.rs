//! The transfer endpoint: HTTP surface of the flash session protocol.
//!
//! Handlers validate from scratch on every request and delegate to the
//! session authority and the vault. The only transformation owned here
//! is error → status code mapping and the fetch-time re-encryption of
//! vault plaintext under the session key.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

use flashlock_crypto::{aead, base64_std_encode, hash_for_log};
use flashlock_proto::{
    CompleteRequest, CompleteResponse, CreateSessionRequest, HwidQuery, SessionResponse,
};

use super::format_timestamp_rfc3339;
use crate::error::ApiError;
use crate::sessions::SessionView;
use crate::state::AppState;

fn session_response(view: SessionView) -> Result<SessionResponse, ApiError> {
    Ok(SessionResponse {
        session_id: view.session_id,
        wrapped_session_key_base64: base64_std_encode(&view.wrapped_key),
        expires_at: format_timestamp_rfc3339(view.expires_at)?,
        status: view.status,
        firmware_files: view.artifacts,
        credit_cost: view.credit_cost,
    })
}

/// POST /api/flash/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    tracing::info!(
        hwid = %hash_for_log(&req.hwid),
        device_type = %req.device_type,
        "Flash session requested"
    );

    let view = state.authority.create(
        &state.vault,
        &req.hwid,
        &req.device_type,
        &req.client_public_key_pem,
    )?;

    Ok((StatusCode::CREATED, Json(session_response(view)?)))
}

/// GET /api/flash/sessions/:session_id
pub async fn read_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<HwidQuery>,
) -> Result<Json<SessionResponse>, ApiError> {
    let view = state
        .authority
        .lookup(&session_id, &query.hwid)
        .ok_or(ApiError::NotFound)?;
    Ok(Json(session_response(view)?))
}

/// GET /api/flash/sessions/:session_id/firmware/:artifact
///
/// Streams `nonce || tag || ciphertext` under the *session* key with a
/// nonce freshly sampled for this request. The vault plaintext exists
/// only inside this handler and is zeroed when it drops.
pub async fn fetch_artifact(
    State(state): State<Arc<AppState>>,
    Path((session_id, artifact)): Path<(String, String)>,
    Query(query): Query<HwidQuery>,
) -> Result<Response, ApiError> {
    let usable = state.authority.require_usable(&session_id, &query.hwid)?;

    if !usable.artifacts.iter().any(|name| name == &artifact) {
        return Err(ApiError::InvalidRequest(format!(
            "artifact {artifact} is not part of this session's manifest"
        )));
    }

    let plaintext = state.vault.open_plaintext(&artifact)?;
    let blob = aead::seal(usable.key.as_bytes(), plaintext.as_slice())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    drop(plaintext);

    tracing::info!(
        session = %hash_for_log(&session_id),
        artifact = %artifact,
        bytes = blob.len(),
        "Artifact served"
    );

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        blob,
    )
        .into_response())
}

/// POST /api/flash/sessions/:session_id/complete
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let outcome = state.authority.complete(
        &session_id,
        &req.hwid,
        req.success,
        req.error_message.as_deref(),
    )?;

    let credits_deducted = outcome.accepted && req.success && outcome.credit_cost > 0;
    if credits_deducted {
        state
            .credits
            .record_burn(&session_id, &outcome.device_type, outcome.credit_cost);
    }

    let message = if outcome.accepted {
        if req.success {
            "flash recorded; session burned".to_string()
        } else {
            "failure recorded; session burned".to_string()
        }
    } else {
        format!("session is {}", outcome.status)
    };

    Ok(Json(CompleteResponse {
        success: outcome.accepted,
        message,
        credits_deducted,
    }))
}
