use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// How one device type is flashed: the tool binary (looked up in the
/// tools directory) and its argument template. Placeholders of the form
/// `{artifact-name}` are replaced with materialized file paths.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolProfile {
    pub tool: String,
    pub args_template: String,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the flashlock server
    pub server_url: String,

    /// Directory holding the native flash tools
    pub tools_dir: PathBuf,

    /// Whether tool binaries are checked against the hash allowlist
    pub verify_tools: bool,

    /// Tool file name → expected SHA-256 (lowercase or uppercase hex)
    pub tool_hashes: HashMap<String, String>,

    /// RSA modulus size for the client keypair
    pub key_bits: usize,

    /// Secure-overwrite passes applied to each temp file
    pub overwrite_passes: u32,

    /// Where the protected client key lives
    pub data_dir: PathBuf,

    /// Request timeout; generous because firmware transfers are large
    pub http_timeout: Duration,

    /// Device type → flash tool table
    pub devices: HashMap<String, ToolProfile>,
}

impl ClientConfig {
    /// The two device families supported out of the box.
    pub fn builtin_devices() -> HashMap<String, ToolProfile> {
        let mut devices = HashMap::new();
        devices.insert(
            "MTK6580".to_string(),
            ToolProfile {
                tool: "mtkflash".to_string(),
                args_template: "-loader {usbloader-5577.bin} -write system {system.bin}"
                    .to_string(),
            },
        );
        devices.insert(
            "MTK6739".to_string(),
            ToolProfile {
                tool: "mtkflash".to_string(),
                args_template: "-loader {usbloader-6739.bin} -write system {system.bin}"
                    .to_string(),
            },
        );
        devices
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let server_url =
            std::env::var("FLASHLOCK_SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:8443".to_string());

        let tools_dir: PathBuf = std::env::var("TOOLS_DIR")
            .unwrap_or_else(|_| "./tools".to_string())
            .into();

        let verify_tools = match std::env::var("TOOL_INTEGRITY_CHECK").as_deref() {
            Ok("false") | Ok("0") => false,
            Ok(_) => true,
            Err(_) => true,
        };

        let tool_hashes = match std::env::var("TOOL_HASHES_PATH") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read tool allowlist at {path}"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid tool allowlist at {path}"))?
            }
            Err(_) => HashMap::new(),
        };

        let key_bits = std::env::var("CLIENT_KEY_BITS")
            .unwrap_or_else(|_| "2048".to_string())
            .parse()?;

        let overwrite_passes = std::env::var("OVERWRITE_PASSES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()?;

        let data_dir: PathBuf = std::env::var("DATA_DIR")
            .unwrap_or_else(|_| "./.flashlock".to_string())
            .into();

        let http_timeout = Duration::from_secs(
            std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()?,
        );

        let devices = match std::env::var("DEVICE_TOOLS_PATH") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read device tool table at {path}"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid device tool table at {path}"))?
            }
            Err(_) => Self::builtin_devices(),
        };

        Ok(ClientConfig {
            server_url,
            tools_dir,
            verify_tools,
            tool_hashes,
            key_bits,
            overwrite_passes,
            data_dir,
            http_timeout,
            devices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_devices_cover_both_families() {
        let devices = ClientConfig::builtin_devices();
        let mtk6580 = devices.get("MTK6580").unwrap();
        assert_eq!(mtk6580.tool, "mtkflash");
        assert!(mtk6580.args_template.contains("{usbloader-5577.bin}"));
        assert!(mtk6580.args_template.contains("{system.bin}"));
        assert!(devices.contains_key("MTK6739"));
    }
}
