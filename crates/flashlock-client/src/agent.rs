//! The flash agent: client-side orchestrator of one flash.
//!
//! A flash is a strictly sequential ceremony — request session, unwrap
//! key, fetch and decrypt each artifact in manifest order, run the
//! tool, report — with a suspension point at every network call and the
//! process wait. The agent recovers from nothing: any failure after the
//! session exists triggers a best-effort completion with
//! `success=false` and a reason, and the unwrapped session key is
//! zeroized on every path out.

use flashlock_crypto::{aead, base64_std_decode, hash_for_log, SecretBytes};
use flashlock_proto::{CompleteRequest, CreateSessionRequest, SessionResponse};

use crate::cancel::CancelToken;
use crate::config::{ClientConfig, ToolProfile};
use crate::error::FlashError;
use crate::http::FlashApi;
use crate::hwid;
use crate::keystore::KeyCustodian;
use crate::progress::{FlashPhase, ProgressEvent, ProgressSink};
use crate::tool::ToolSupervisor;

/// What a finished flash looked like from the server's point of view.
#[derive(Debug, Clone)]
pub struct FlashOutcome {
    pub session_id: String,
    /// Whether the flash tool succeeded (and the server recorded it).
    pub success: bool,
    pub credits_deducted: bool,
    pub message: String,
}

pub struct FlashAgent {
    config: ClientConfig,
    api: FlashApi,
    custodian: KeyCustodian,
    supervisor: ToolSupervisor,
}

impl FlashAgent {
    /// Build the agent, loading or creating the client keypair.
    pub fn new(config: ClientConfig) -> Result<Self, FlashError> {
        let api = FlashApi::new(&config.server_url, config.http_timeout)?;
        let custodian = KeyCustodian::ensure(&config.data_dir, config.key_bits)?;
        let supervisor = ToolSupervisor::new(
            config.tools_dir.clone(),
            config.verify_tools,
            config.tool_hashes.clone(),
            config.overwrite_passes,
        );
        Ok(Self {
            config,
            api,
            custodian,
            supervisor,
        })
    }

    /// Perform one complete flash for `device_type`.
    pub async fn flash(
        &self,
        device_type: &str,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<FlashOutcome, FlashError> {
        let profile = self
            .config
            .devices
            .get(device_type)
            .ok_or_else(|| FlashError::UnknownDeviceType(device_type.to_string()))?;

        let hwid = hwid::fingerprint();
        progress.emit(ProgressEvent::Phase(FlashPhase::SessionRequested));
        cancel.ensure_active()?;

        let session = self
            .api
            .create_session(&CreateSessionRequest {
                hwid: hwid.to_string(),
                device_type: device_type.to_string(),
                client_public_key_pem: self.custodian.public_pem().to_string(),
            })
            .await?;

        tracing::info!(
            session = %hash_for_log(&session.session_id),
            device_type,
            artifacts = session.firmware_files.len(),
            "Flash session established"
        );

        // From here on the session exists server-side; every exit goes
        // through the completion call.
        match self.run_session(&session, profile, hwid, progress, cancel).await {
            Ok(tool_succeeded) => {
                let reason = (!tool_succeeded).then(|| "Flash tool failed".to_string());
                let outcome = self
                    .report(&session.session_id, hwid, tool_succeeded, reason, progress)
                    .await?;
                progress.emit(ProgressEvent::Phase(FlashPhase::Done));
                Ok(outcome)
            }
            Err(error) => {
                progress.emit(ProgressEvent::Phase(FlashPhase::Aborted));
                let reason = error.completion_reason();
                if let Err(report_error) = self
                    .report(&session.session_id, hwid, false, Some(reason), progress)
                    .await
                {
                    tracing::warn!(
                        error = %report_error,
                        "Best-effort completion call failed"
                    );
                }
                Err(error)
            }
        }
    }

    /// Unwrap, fetch, decrypt, and flash. The session key lives on this
    /// frame and is zeroized when it unwinds, error or not.
    async fn run_session(
        &self,
        session: &SessionResponse,
        profile: &ToolProfile,
        hwid: &str,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<bool, FlashError> {
        let wrapped =
            base64_std_decode(&session.wrapped_session_key_base64).map_err(|_| FlashError::Wrap)?;
        let session_key = self.custodian.unwrap(&wrapped)?;
        progress.emit(ProgressEvent::Phase(FlashPhase::SessionEstablished));

        let mut artifacts: Vec<(String, SecretBytes)> =
            Vec::with_capacity(session.firmware_files.len());
        for (index, name) in session.firmware_files.iter().enumerate() {
            cancel.ensure_active()?;
            progress.emit(ProgressEvent::Phase(FlashPhase::Fetching(index)));

            let blob = self
                .api
                .fetch_artifact(&session.session_id, hwid, name, cancel)
                .await?;
            let plaintext = aead::open(session_key.as_bytes(), &blob)
                .map_err(|_| FlashError::Integrity(name.clone()))?;

            progress.emit(ProgressEvent::Phase(FlashPhase::Decrypted(index)));
            artifacts.push((name.clone(), plaintext));
        }

        cancel.ensure_active()?;
        progress.emit(ProgressEvent::Phase(FlashPhase::ToolRunning));
        self.supervisor
            .run(
                &profile.tool,
                &profile.args_template,
                &artifacts,
                progress,
                cancel,
            )
            .await
    }

    async fn report(
        &self,
        session_id: &str,
        hwid: &str,
        success: bool,
        reason: Option<String>,
        progress: &dyn ProgressSink,
    ) -> Result<FlashOutcome, FlashError> {
        progress.emit(ProgressEvent::Phase(FlashPhase::Reporting));
        let response = self
            .api
            .complete(
                session_id,
                &CompleteRequest {
                    hwid: hwid.to_string(),
                    success,
                    error_message: reason,
                },
            )
            .await?;

        tracing::info!(
            session = %hash_for_log(session_id),
            success,
            credits_deducted = response.credits_deducted,
            "Flash outcome reported"
        );

        Ok(FlashOutcome {
            session_id: session_id.to_string(),
            success,
            credits_deducted: response.credits_deducted,
            message: response.message,
        })
    }
}
