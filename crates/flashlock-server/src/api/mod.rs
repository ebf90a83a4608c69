pub mod flash;
pub mod health;

use crate::error::ApiError;

/// Format a unix timestamp (seconds) as RFC3339.
pub fn format_timestamp_rfc3339(timestamp: u64) -> Result<String, ApiError> {
    Ok(chrono::DateTime::from_timestamp(timestamp as i64, 0)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Invalid timestamp")))?
        .to_rfc3339())
}
