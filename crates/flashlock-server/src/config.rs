use anyhow::Result;
use flashlock_crypto::{base64_std_decode, SecretKey, DEFAULT_SESSION_TTL_SECS, KEY_SIZE};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::catalog::DeviceCatalog;

/// How the server was asked to run. Production refuses to start without
/// an explicit master key; dev may self-generate one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Dev,
    Prod,
}

/// Server configuration
pub struct Config {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Directory holding the encrypted-at-rest firmware files
    pub storage_dir: PathBuf,

    /// Session lifetime in seconds
    pub session_ttl_secs: u64,

    /// Cadence of the background sweep
    pub sweep_interval_secs: u64,

    /// How long burned sessions linger before the sweep removes them
    pub burned_retention_secs: u64,

    pub run_mode: RunMode,

    /// Device type → manifest/cost table
    pub catalog: DeviceCatalog,

    /// Vault master key. Held here only between `from_env` and
    /// `AppState::new`, which moves it into the vault.
    master_key: SecretKey,
}

// Custom Debug implementation to prevent key leakage
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("storage_dir", &self.storage_dir)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("burned_retention_secs", &self.burned_retention_secs)
            .field("run_mode", &self.run_mode)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bind_address = std::env::var("BIND_ADDRESS")
            .unwrap_or_else(|_| "127.0.0.1:8443".to_string())
            .parse()?;

        let storage_dir: PathBuf = std::env::var("FIRMWARE_DIR")
            .unwrap_or_else(|_| "./firmware".to_string())
            .into();

        let run_mode = match std::env::var("RUN_MODE").as_deref() {
            Ok("dev") => RunMode::Dev,
            _ => RunMode::Prod,
        };

        let master_key = match std::env::var("VAULT_MASTER_KEY") {
            Ok(encoded) => {
                let bytes = base64_std_decode(encoded.trim())?;
                if bytes.len() != KEY_SIZE {
                    anyhow::bail!(
                        "VAULT_MASTER_KEY must be {KEY_SIZE} bytes (got {})",
                        bytes.len()
                    );
                }
                SecretKey::from_slice(&bytes)
                    .map_err(|e| anyhow::anyhow!("invalid VAULT_MASTER_KEY: {e}"))?
            }
            Err(_) => {
                if run_mode == RunMode::Prod {
                    anyhow::bail!("VAULT_MASTER_KEY is required when RUN_MODE=prod");
                }
                tracing::warn!(
                    "No VAULT_MASTER_KEY configured; generated a dev-only key. \
                     Firmware provisioned under it is unreadable after restart."
                );
                SecretKey::new(flashlock_crypto::generate_random_bytes())
            }
        };

        let session_ttl_secs = std::env::var("SESSION_TTL_MINUTES")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()?
            .map(|minutes| minutes * 60)
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let sweep_interval_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()?;

        let burned_retention_secs = std::env::var("BURNED_RETENTION_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()?;

        let catalog = match std::env::var("DEVICE_CATALOG_PATH") {
            Ok(path) => DeviceCatalog::from_json_file(path.as_ref())?,
            Err(_) => DeviceCatalog::builtin(),
        };

        Ok(Config {
            bind_address,
            storage_dir,
            session_ttl_secs,
            sweep_interval_secs,
            burned_retention_secs,
            run_mode,
            catalog,
            master_key,
        })
    }

    /// Assemble a configuration directly. Used by embedding code and
    /// tests; `from_env` is the production path.
    pub fn from_parts(
        bind_address: SocketAddr,
        storage_dir: PathBuf,
        master_key: SecretKey,
        session_ttl_secs: u64,
        catalog: DeviceCatalog,
        run_mode: RunMode,
    ) -> Self {
        Config {
            bind_address,
            storage_dir,
            session_ttl_secs,
            sweep_interval_secs: 300,
            burned_retention_secs: 600,
            run_mode,
            catalog,
            master_key,
        }
    }

    /// Move the master key out of the configuration, leaving zeros
    /// behind. The vault is the key's only long-term home.
    pub fn take_master_key(&mut self) -> SecretKey {
        std::mem::replace(&mut self.master_key, SecretKey::zeroed())
    }
}
