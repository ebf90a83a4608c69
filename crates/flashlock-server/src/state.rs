use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::credits::{CreditLedger, LoggingLedger};
use crate::sessions::SessionAuthority;
use crate::vault::Vault;

/// Application state shared across all handlers.
///
/// Built once at program start by plain constructor composition: the
/// vault owns the master key, the authority owns the session table, and
/// everything else borrows through these handles.
pub struct AppState {
    pub config: Config,
    pub vault: Arc<Vault>,
    pub authority: Arc<SessionAuthority>,
    pub credits: Arc<dyn CreditLedger>,
}

impl AppState {
    pub fn new(mut config: Config) -> Result<Self> {
        anyhow::ensure!(
            config.storage_dir.is_dir(),
            "Firmware storage directory {} does not exist",
            config.storage_dir.display()
        );

        let master_key = config.take_master_key();
        let vault = Arc::new(Vault::new(
            config.storage_dir.clone(),
            master_key,
            config.catalog.clone(),
        ));

        let authority = Arc::new(SessionAuthority::new(
            config.session_ttl_secs,
            config.burned_retention_secs,
        ));

        tracing::info!(
            storage_dir = %config.storage_dir.display(),
            session_ttl_secs = config.session_ttl_secs,
            device_types = vault.catalog().device_types().count(),
            "Vault and session authority initialized"
        );

        Ok(AppState {
            config,
            vault,
            authority,
            credits: Arc::new(LoggingLedger),
        })
    }

    /// Swap in a different accounting collaborator.
    pub fn with_credit_ledger(mut self, ledger: Arc<dyn CreditLedger>) -> Self {
        self.credits = ledger;
        self
    }
}
