//! Typed HTTP client for the flash session protocol.
//!
//! Thin wrapper over reqwest: base-url joining, JSON error-body
//! probing, and the status-code → error mapping the protocol defines.
//! Artifact downloads are read chunk by chunk so cancellation is
//! observed mid-transfer.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use zeroize::Zeroize;

use flashlock_proto::{
    CompleteRequest, CompleteResponse, CreateSessionRequest, SessionResponse,
};

use crate::cancel::CancelToken;
use crate::error::FlashError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FlashApi {
    client: Client,
    base_url: String,
}

#[derive(serde::Deserialize, Debug)]
struct ServerErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl FlashApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FlashError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FlashError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionResponse, FlashError> {
        let response = self
            .client
            .post(self.url("/api/flash/sessions"))
            .json(request)
            .send()
            .await?;
        Self::handle_json(response).await
    }

    pub async fn read_session(
        &self,
        session_id: &str,
        hwid: &str,
    ) -> Result<SessionResponse, FlashError> {
        let response = self
            .client
            .get(self.url(&format!("/api/flash/sessions/{session_id}")))
            .query(&[("hwid", hwid)])
            .send()
            .await?;
        Self::handle_json(response).await
    }

    /// Download one artifact blob (`nonce || tag || ciphertext` under
    /// the session key). The body is consumed chunk by chunk; if the
    /// token fires mid-transfer the partial buffer is zeroed and
    /// dropped before the error surfaces.
    pub async fn fetch_artifact(
        &self,
        session_id: &str,
        hwid: &str,
        artifact: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, FlashError> {
        cancel.ensure_active()?;

        let mut response = self
            .client
            .get(self.url(&format!(
                "/api/flash/sessions/{session_id}/firmware/{artifact}"
            )))
            .query(&[("hwid", hwid)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::map_error(response).await);
        }

        let mut blob: Vec<u8> = Vec::new();
        loop {
            if cancel.is_cancelled() {
                blob.zeroize();
                return Err(FlashError::Cancelled);
            }
            match response.chunk().await {
                Ok(Some(chunk)) => blob.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    blob.zeroize();
                    return Err(FlashError::Transport(e.to_string()));
                }
            }
        }
        Ok(blob)
    }

    pub async fn complete(
        &self,
        session_id: &str,
        request: &CompleteRequest,
    ) -> Result<CompleteResponse, FlashError> {
        let response = self
            .client
            .post(self.url(&format!("/api/flash/sessions/{session_id}/complete")))
            .json(request)
            .send()
            .await?;
        Self::handle_json(response).await
    }

    async fn handle_json<T: DeserializeOwned>(response: Response) -> Result<T, FlashError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| FlashError::Transport(e.to_string()));
        }
        Err(Self::map_error(response).await)
    }

    async fn map_error(response: Response) -> FlashError {
        let status = response.status();
        let body = response.json::<ServerErrorBody>().await.ok();
        let message = body
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        match status {
            StatusCode::NOT_FOUND => FlashError::SessionNotFound,
            StatusCode::BAD_REQUEST => FlashError::Rejected(message),
            _ if message.contains("integrity") => FlashError::Integrity(message),
            _ => FlashError::Transport(format!("HTTP {}: {message}", status.as_u16())),
        }
    }
}
