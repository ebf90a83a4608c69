//! The session authority: owner of all one-time flash sessions.
//!
//! A session is a single-use, time-bounded, hardware-bound authorization
//! to perform one flash. The authority enforces the invariants:
//!
//! 1. every operation must present the fingerprint bound at create;
//! 2. at most one transition out of `Active` ever succeeds;
//! 3. nothing is served after expiry;
//! 4. raw session-key bytes are overwritten before the session object
//!    is released (and at every terminal transition);
//! 5. identifiers carry 256 bits of CSPRNG entropy.
//!
//! The table is plain shared mutable state behind a mutex; transitions
//! only fire when the current status is the expected predecessor, so
//! terminal states are sticky under concurrency.

use flashlock_proto::SessionStatus;
use flashlock_crypto::{
    current_timestamp, generate_random_bytes, hash_for_log, new_session_token, wrap_key,
    public_key_from_pem, SecretKey,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::vault::{Vault, VaultError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("firmware for device type {0} is not fully provisioned")]
    FirmwareUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidInput(&'static str),

    #[error("invalid client public key: {0}")]
    PublicKey(String),

    /// Unknown identifier or fingerprint mismatch. Deliberately one
    /// variant: the two cases must stay observationally identical.
    #[error("session not found")]
    NotFound,

    #[error("session is not usable: {0}")]
    Unusable(SessionStatus),

    #[error("session authority failure: {0}")]
    Internal(String),
}

/// One minted session. Lives only inside the authority's table; the
/// handlers see [`SessionView`] and [`UsableSession`] projections.
struct FlashSession {
    session_id: String,
    hwid: String,
    device_type: String,
    key: SecretKey,
    wrapped_key: Vec<u8>,
    created_at: u64,
    expires_at: u64,
    artifacts: Vec<String>,
    credit_cost: u32,
    status: SessionStatus,
    failure_reason: Option<String>,
    /// Set when the session leaves `Active`; drives sweep retention.
    terminated_at: Option<u64>,
}

impl FlashSession {
    fn is_usable(&self, now: u64) -> bool {
        self.status == SessionStatus::Active && now <= self.expires_at
    }

    /// Lazy Active → Expired transition. The key dies with the
    /// transition; nothing can legitimately use it afterwards.
    fn expire_if_due(&mut self, now: u64) {
        if self.status == SessionStatus::Active && now > self.expires_at {
            self.status = SessionStatus::Expired;
            self.terminated_at = Some(now);
            self.key.wipe();
            debug!(session = %hash_for_log(&self.session_id), "Session expired");
        }
    }
}

/// Read-only projection of a session, safe to hand to response code.
/// Carries the wrapped key (freely copyable) but never the raw key.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub device_type: String,
    pub wrapped_key: Vec<u8>,
    pub expires_at: u64,
    pub status: SessionStatus,
    pub artifacts: Vec<String>,
    pub credit_cost: u32,
}

impl SessionView {
    fn of(session: &FlashSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            device_type: session.device_type.clone(),
            wrapped_key: session.wrapped_key.clone(),
            expires_at: session.expires_at,
            status: session.status,
            artifacts: session.artifacts.clone(),
            credit_cost: session.credit_cost,
        }
    }
}

/// What an artifact-serving handler needs from a usable session: a
/// private copy of the key (zeroized on drop) and the manifest.
#[derive(Debug)]
pub struct UsableSession {
    pub key: SecretKey,
    pub artifacts: Vec<String>,
}

/// Result of a completion attempt whose session binding was valid.
#[derive(Debug)]
pub struct CompleteOutcome {
    /// False when the session was already terminal or expired.
    pub accepted: bool,
    pub status: SessionStatus,
    pub device_type: String,
    pub credit_cost: u32,
}

/// Counters reported by one sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub expired_removed: usize,
    pub burned_removed: usize,
}

pub struct SessionAuthority {
    sessions: Mutex<HashMap<String, FlashSession>>,
    ttl_secs: u64,
    burned_retention_secs: u64,
}

/// Handle mutex lock with poison recovery: a panicked handler must not
/// wedge the whole session table.
fn lock_sessions(
    mutex: &Mutex<HashMap<String, FlashSession>>,
) -> MutexGuard<'_, HashMap<String, FlashSession>> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Session table mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

impl SessionAuthority {
    pub fn new(ttl_secs: u64, burned_retention_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl_secs,
            burned_retention_secs,
        }
    }

    /// Mint a new session bound to `hwid` for `device_type`.
    ///
    /// Validates inputs, confirms the vault holds every artifact the
    /// manifest requires, draws a fresh session key, and wraps it under
    /// the caller's public key. The raw key never leaves the table
    /// except as the wrapped form and per-fetch copies.
    pub fn create(
        &self,
        vault: &Vault,
        hwid: &str,
        device_type: &str,
        client_public_key_pem: &str,
    ) -> Result<SessionView, SessionError> {
        if hwid.trim().is_empty() {
            return Err(SessionError::InvalidInput("HWID must not be empty"));
        }
        if device_type.trim().is_empty() {
            return Err(SessionError::InvalidInput("DeviceType must not be empty"));
        }
        if client_public_key_pem.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "ClientPublicKeyPem must not be empty",
            ));
        }

        let profile = match vault.profile(device_type) {
            Ok(profile) => profile,
            Err(VaultError::UnknownDeviceType(t)) => {
                return Err(SessionError::UnknownDeviceType(t))
            }
            Err(e) => return Err(SessionError::Internal(e.to_string())),
        };

        match vault.all_present(device_type) {
            Ok(true) => {}
            Ok(false) => {
                return Err(SessionError::FirmwareUnavailable(device_type.to_string()))
            }
            Err(e) => return Err(SessionError::Internal(e.to_string())),
        }

        let public_key = public_key_from_pem(client_public_key_pem)
            .map_err(|e| SessionError::PublicKey(e.to_string()))?;

        let key = SecretKey::new(generate_random_bytes());
        let wrapped_key =
            wrap_key(&public_key, key.as_bytes()).map_err(|e| SessionError::PublicKey(e.to_string()))?;

        let now = current_timestamp();
        let expires_at = now + self.ttl_secs;

        // Collisions are statistically impossible at 256 bits, but the
        // insert still refuses to clobber an existing entry.
        let session_id = {
            let mut sessions = lock_sessions(&self.sessions);
            loop {
                let candidate = new_session_token();
                if sessions.contains_key(&candidate) {
                    continue;
                }
                sessions.insert(
                    candidate.clone(),
                    FlashSession {
                        session_id: candidate.clone(),
                        hwid: hwid.to_string(),
                        device_type: device_type.to_string(),
                        key,
                        wrapped_key: wrapped_key.clone(),
                        created_at: now,
                        expires_at,
                        artifacts: profile.artifacts.clone(),
                        credit_cost: profile.credit_cost,
                        status: SessionStatus::Active,
                        failure_reason: None,
                        terminated_at: None,
                    },
                );
                break candidate;
            }
        };

        info!(
            session = %hash_for_log(&session_id),
            hwid = %hash_for_log(hwid),
            device_type = %device_type,
            ttl_secs = self.ttl_secs,
            "Minted flash session"
        );

        let sessions = lock_sessions(&self.sessions);
        Ok(SessionView::of(&sessions[&session_id]))
    }

    /// Look up a session by identifier and bound fingerprint.
    ///
    /// Unknown identifier and fingerprint mismatch both return `None`.
    /// An `Active` session past its expiry transitions to `Expired`
    /// before being returned.
    pub fn lookup(&self, session_id: &str, hwid: &str) -> Option<SessionView> {
        let now = current_timestamp();
        let mut sessions = lock_sessions(&self.sessions);
        let session = sessions.get_mut(session_id)?;
        if session.hwid != hwid {
            warn!(
                session = %hash_for_log(session_id),
                presented = %hash_for_log(hwid),
                "Fingerprint mismatch on session lookup"
            );
            return None;
        }
        session.expire_if_due(now);
        Some(SessionView::of(session))
    }

    /// Like [`lookup`](Self::lookup), but fails unless the session is
    /// currently usable, and returns a private copy of the session key.
    pub fn require_usable(
        &self,
        session_id: &str,
        hwid: &str,
    ) -> Result<UsableSession, SessionError> {
        let now = current_timestamp();
        let mut sessions = lock_sessions(&self.sessions);
        let session = sessions.get_mut(session_id).ok_or(SessionError::NotFound)?;
        if session.hwid != hwid {
            warn!(
                session = %hash_for_log(session_id),
                presented = %hash_for_log(hwid),
                "Fingerprint mismatch on artifact request"
            );
            return Err(SessionError::NotFound);
        }
        session.expire_if_due(now);
        if !session.is_usable(now) {
            return Err(SessionError::Unusable(session.status));
        }
        Ok(UsableSession {
            key: SecretKey::new(*session.key.as_bytes()),
            artifacts: session.artifacts.clone(),
        })
    }

    /// Record the outcome of a flash and burn the session.
    ///
    /// Valid transitions run `Active → Completed|Failed → Burned` in one
    /// step; the key is overwritten in the same critical section. A
    /// session already out of `Active` is left untouched and the
    /// completion is reported as not accepted.
    pub fn complete(
        &self,
        session_id: &str,
        hwid: &str,
        success: bool,
        reason: Option<&str>,
    ) -> Result<CompleteOutcome, SessionError> {
        let now = current_timestamp();
        let mut sessions = lock_sessions(&self.sessions);
        let session = sessions.get_mut(session_id).ok_or(SessionError::NotFound)?;
        if session.hwid != hwid {
            warn!(
                session = %hash_for_log(session_id),
                presented = %hash_for_log(hwid),
                "Fingerprint mismatch on completion"
            );
            return Err(SessionError::NotFound);
        }

        session.expire_if_due(now);
        if session.status != SessionStatus::Active {
            return Ok(CompleteOutcome {
                accepted: false,
                status: session.status,
                device_type: session.device_type.clone(),
                credit_cost: session.credit_cost,
            });
        }

        session.status = if success {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        if let Some(reason) = reason {
            session.failure_reason = Some(reason.to_string());
        }

        // Burn immediately: the terminal outcome is recorded, the key
        // dies, and no further artifact can ever be served.
        let recorded = session.status;
        session.status = SessionStatus::Burned;
        session.terminated_at = Some(now);
        session.key.wipe();

        info!(
            session = %hash_for_log(session_id),
            outcome = %recorded,
            lifetime_secs = now.saturating_sub(session.created_at),
            "Session completed and burned"
        );

        Ok(CompleteOutcome {
            accepted: true,
            status: recorded,
            device_type: session.device_type.clone(),
            credit_cost: session.credit_cost,
        })
    }

    /// Remove expired sessions and burned sessions past the quiet
    /// period, wiping keys on the way out. Idempotent on a quiesced
    /// table.
    pub fn sweep(&self) -> SweepStats {
        let now = current_timestamp();
        let mut stats = SweepStats::default();
        let mut sessions = lock_sessions(&self.sessions);

        sessions.retain(|_, session| {
            session.expire_if_due(now);
            match session.status {
                SessionStatus::Expired => {
                    session.key.wipe();
                    stats.expired_removed += 1;
                    false
                }
                SessionStatus::Burned => {
                    let terminated = session.terminated_at.unwrap_or(now);
                    if now.saturating_sub(terminated) >= self.burned_retention_secs {
                        session.key.wipe();
                        stats.burned_removed += 1;
                        false
                    } else {
                        true
                    }
                }
                _ => true,
            }
        });

        stats
    }

    /// Number of sessions currently in the table (any status).
    pub fn len(&self) -> usize {
        lock_sessions(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn force_expiry(&self, session_id: &str, seconds_ago: u64) {
        let mut sessions = lock_sessions(&self.sessions);
        let session = sessions.get_mut(session_id).unwrap();
        session.expires_at = current_timestamp().saturating_sub(seconds_ago);
    }

    #[cfg(test)]
    fn force_terminated_at(&self, session_id: &str, timestamp: u64) {
        let mut sessions = lock_sessions(&self.sessions);
        sessions.get_mut(session_id).unwrap().terminated_at = Some(timestamp);
    }
}

/// Start the periodic sweep driving expired and burned sessions out of
/// the table.
pub fn start_sweep_task(
    authority: Arc<SessionAuthority>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Skip the first immediate tick
        interval.tick().await;

        info!(interval_secs, "Started session sweep task");

        loop {
            interval.tick().await;
            let stats = authority.sweep();
            if stats.expired_removed > 0 || stats.burned_removed > 0 {
                info!(
                    expired = stats.expired_removed,
                    burned = stats.burned_removed,
                    "Sweep removed sessions"
                );
            } else {
                debug!("Sweep found nothing to remove");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DeviceCatalog;
    use crate::vault::provision_artifact;
    use flashlock_crypto::{generate_keypair, public_key_to_pem, unwrap_key};
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;

    const HWID: &str = "8EFC8F567BCCED17791359A306F0BA62";

    fn client_keypair() -> &'static RsaPrivateKey {
        static KEYPAIR: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEYPAIR.get_or_init(|| generate_keypair(2048).unwrap())
    }

    fn client_pem() -> String {
        public_key_to_pem(&client_keypair().to_public_key()).unwrap()
    }

    fn provisioned_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempfile::tempdir().unwrap();
        let key_bytes: [u8; 32] = generate_random_bytes();
        let key = SecretKey::new(key_bytes);
        provision_artifact(dir.path(), &key, "system.bin", b"system image").unwrap();
        provision_artifact(dir.path(), &key, "usbloader-5577.bin", b"loader image").unwrap();
        provision_artifact(dir.path(), &key, "usbloader-6739.bin", b"loader image b").unwrap();
        let vault = Vault::new(
            dir.path().to_path_buf(),
            SecretKey::new(key_bytes),
            DeviceCatalog::builtin(),
        );
        (dir, vault)
    }

    #[test]
    fn test_create_and_lookup_happy_path() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);

        let before = current_timestamp();
        let view = authority
            .create(&vault, HWID, "MTK6580", &client_pem())
            .unwrap();

        assert_eq!(view.status, SessionStatus::Active);
        assert_eq!(view.artifacts, vec!["system.bin", "usbloader-5577.bin"]);
        assert_eq!(view.credit_cost, 1);
        assert!(view.expires_at >= before + 900);
        assert!(view.expires_at <= current_timestamp() + 900);
        assert_eq!(view.session_id.len(), 43);

        // The wrapped key unwraps to the key the authority serves with.
        let unwrapped = unwrap_key(client_keypair(), &view.wrapped_key).unwrap();
        let usable = authority.require_usable(&view.session_id, HWID).unwrap();
        assert_eq!(unwrapped.as_bytes(), usable.key.as_bytes());

        // Read returns the wrap exactly as issued.
        let read = authority.lookup(&view.session_id, HWID).unwrap();
        assert_eq!(read.wrapped_key, view.wrapped_key);
    }

    #[test]
    fn test_create_rejects_empty_inputs() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let pem = client_pem();

        for (hwid, device_type, key) in [
            ("", "MTK6580", pem.as_str()),
            (HWID, "", pem.as_str()),
            (HWID, "MTK6580", ""),
        ] {
            assert!(matches!(
                authority.create(&vault, hwid, device_type, key).unwrap_err(),
                SessionError::InvalidInput(_)
            ));
        }
    }

    #[test]
    fn test_create_rejects_unknown_device_type() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        assert!(matches!(
            authority
                .create(&vault, HWID, "QUALCOMM9999", &client_pem())
                .unwrap_err(),
            SessionError::UnknownDeviceType(_)
        ));
    }

    #[test]
    fn test_create_rejects_unprovisioned_firmware() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(
            dir.path().to_path_buf(),
            SecretKey::new(generate_random_bytes()),
            DeviceCatalog::builtin(),
        );
        let authority = SessionAuthority::new(900, 600);
        assert!(matches!(
            authority
                .create(&vault, HWID, "MTK6580", &client_pem())
                .unwrap_err(),
            SessionError::FirmwareUnavailable(_)
        ));
    }

    #[test]
    fn test_create_rejects_malformed_public_key() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        assert!(matches!(
            authority
                .create(&vault, HWID, "MTK6580", "not a pem")
                .unwrap_err(),
            SessionError::PublicKey(_)
        ));
    }

    #[test]
    fn test_fingerprint_mismatch_is_not_found_and_mutates_nothing() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let view = authority
            .create(&vault, HWID, "MTK6580", &client_pem())
            .unwrap();

        assert!(authority.lookup(&view.session_id, "OTHER-HWID").is_none());
        assert!(matches!(
            authority
                .require_usable(&view.session_id, "OTHER-HWID")
                .unwrap_err(),
            SessionError::NotFound
        ));
        assert!(matches!(
            authority
                .complete(&view.session_id, "OTHER-HWID", true, None)
                .unwrap_err(),
            SessionError::NotFound
        ));

        // Unknown id is indistinguishable from a mismatch.
        assert!(matches!(
            authority.require_usable("missing", HWID).unwrap_err(),
            SessionError::NotFound
        ));

        // The real binding still works: nothing transitioned.
        let read = authority.lookup(&view.session_id, HWID).unwrap();
        assert_eq!(read.status, SessionStatus::Active);
    }

    #[test]
    fn test_expiry_blocks_use_and_completion() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let view = authority
            .create(&vault, HWID, "MTK6580", &client_pem())
            .unwrap();

        authority.force_expiry(&view.session_id, 10);

        assert!(matches!(
            authority
                .require_usable(&view.session_id, HWID)
                .unwrap_err(),
            SessionError::Unusable(SessionStatus::Expired)
        ));

        let read = authority.lookup(&view.session_id, HWID).unwrap();
        assert_eq!(read.status, SessionStatus::Expired);

        let outcome = authority
            .complete(&view.session_id, HWID, true, None)
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.status, SessionStatus::Expired);
    }

    #[test]
    fn test_complete_burns_exactly_once() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let view = authority
            .create(&vault, HWID, "MTK6580", &client_pem())
            .unwrap();

        let outcome = authority
            .complete(&view.session_id, HWID, true, None)
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.status, SessionStatus::Completed);

        // Observable state is Burned, the key is gone, fetches fail.
        let read = authority.lookup(&view.session_id, HWID).unwrap();
        assert_eq!(read.status, SessionStatus::Burned);
        {
            let sessions = lock_sessions(&authority.sessions);
            assert_eq!(sessions[&view.session_id].key.as_bytes(), &[0u8; 32]);
        }
        assert!(matches!(
            authority
                .require_usable(&view.session_id, HWID)
                .unwrap_err(),
            SessionError::Unusable(SessionStatus::Burned)
        ));

        // A second completion is refused.
        let second = authority
            .complete(&view.session_id, HWID, false, Some("retry"))
            .unwrap();
        assert!(!second.accepted);
        assert_eq!(second.status, SessionStatus::Burned);
    }

    #[test]
    fn test_failed_completion_records_reason() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let view = authority
            .create(&vault, HWID, "MTK6580", &client_pem())
            .unwrap();

        let outcome = authority
            .complete(&view.session_id, HWID, false, Some("Flash tool failed"))
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.status, SessionStatus::Failed);

        let sessions = lock_sessions(&authority.sessions);
        assert_eq!(
            sessions[&view.session_id].failure_reason.as_deref(),
            Some("Flash tool failed")
        );
    }

    #[test]
    fn test_sweep_removes_expired_and_quiet_burned() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let pem = client_pem();

        let expired = authority.create(&vault, HWID, "MTK6580", &pem).unwrap();
        let burned = authority.create(&vault, HWID, "MTK6580", &pem).unwrap();
        let fresh_burn = authority.create(&vault, HWID, "MTK6739", &pem).unwrap();
        let live = authority.create(&vault, HWID, "MTK6739", &pem).unwrap();

        authority.force_expiry(&expired.session_id, 10);
        authority
            .complete(&burned.session_id, HWID, true, None)
            .unwrap();
        authority.force_terminated_at(&burned.session_id, current_timestamp() - 700);
        authority
            .complete(&fresh_burn.session_id, HWID, false, Some("cancelled"))
            .unwrap();

        let stats = authority.sweep();
        assert_eq!(stats.expired_removed, 1);
        assert_eq!(stats.burned_removed, 1);
        assert_eq!(authority.len(), 2);

        // Idempotent on the quiesced table.
        let again = authority.sweep();
        assert_eq!(again.expired_removed, 0);
        assert_eq!(again.burned_removed, 0);
        assert_eq!(authority.len(), 2);

        assert!(authority.lookup(&live.session_id, HWID).is_some());
        assert!(authority.lookup(&expired.session_id, HWID).is_none());
    }

    #[test]
    fn test_session_identifiers_are_pairwise_distinct() {
        let (_dir, vault) = provisioned_vault();
        let authority = SessionAuthority::new(900, 600);
        let pem = client_pem();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let view = authority.create(&vault, HWID, "MTK6580", &pem).unwrap();
            assert!(seen.insert(view.session_id));
        }
    }
}
