//! Credit accounting seam.
//!
//! The session protocol only *signals* a burn; whether anything durable
//! happens is the accounting collaborator's business. The default
//! implementation records the burn in the log stream, which is all the
//! core needs.

use flashlock_crypto::hash_for_log;

pub trait CreditLedger: Send + Sync {
    /// Record that a successful flash consumed `cost` credits.
    fn record_burn(&self, session_id: &str, device_type: &str, cost: u32);
}

/// Advisory ledger: burns are logged, not persisted.
pub struct LoggingLedger;

impl CreditLedger for LoggingLedger {
    fn record_burn(&self, session_id: &str, device_type: &str, cost: u32) {
        tracing::info!(
            session = %hash_for_log(session_id),
            device_type = %device_type,
            credits = cost,
            "Credits deducted"
        );
    }
}
