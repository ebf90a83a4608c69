//! The closed set of supported device types.
//!
//! Each device type maps to an ordered artifact manifest and a credit
//! cost. The manifest order matters: clients fetch and hand artifacts to
//! the flash tool in exactly this order.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// What one device type requires for a flash.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceProfile {
    /// Ordered logical artifact names.
    pub artifacts: Vec<String>,
    /// Credits consumed by a successful flash.
    pub credit_cost: u32,
}

/// Device type → profile table.
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    profiles: BTreeMap<String, DeviceProfile>,
}

impl DeviceCatalog {
    /// The two device families shipped by default.
    pub fn builtin() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "MTK6580".to_string(),
            DeviceProfile {
                artifacts: vec!["system.bin".to_string(), "usbloader-5577.bin".to_string()],
                credit_cost: 1,
            },
        );
        profiles.insert(
            "MTK6739".to_string(),
            DeviceProfile {
                artifacts: vec!["system.bin".to_string(), "usbloader-6739.bin".to_string()],
                credit_cost: 1,
            },
        );
        Self { profiles }
    }

    /// Load a catalog from a JSON file of the shape
    /// `{"MTK6580": {"artifacts": [...], "credit_cost": 1}, ...}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device catalog at {}", path.display()))?;
        let profiles: BTreeMap<String, DeviceProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid device catalog at {}", path.display()))?;
        anyhow::ensure!(!profiles.is_empty(), "Device catalog must not be empty");
        for (device_type, profile) in &profiles {
            anyhow::ensure!(
                !profile.artifacts.is_empty(),
                "Device type {device_type} has an empty artifact manifest"
            );
        }
        Ok(Self { profiles })
    }

    pub fn profile(&self, device_type: &str) -> Option<&DeviceProfile> {
        self.profiles.get(device_type)
    }

    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog_families() {
        let catalog = DeviceCatalog::builtin();
        let profile = catalog.profile("MTK6580").unwrap();
        assert_eq!(profile.artifacts, vec!["system.bin", "usbloader-5577.bin"]);
        assert_eq!(profile.credit_cost, 1);

        assert!(catalog.profile("MTK6739").is_some());
        assert!(catalog.profile("unknown").is_none());
        assert_eq!(catalog.device_types().count(), 2);
    }

    #[test]
    fn test_catalog_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"X200": {{"artifacts": ["boot.img", "system.img"], "credit_cost": 2}}}}"#
        )
        .unwrap();

        let catalog = DeviceCatalog::from_json_file(file.path()).unwrap();
        let profile = catalog.profile("X200").unwrap();
        assert_eq!(profile.artifacts, vec!["boot.img", "system.img"]);
        assert_eq!(profile.credit_cost, 2);
    }

    #[test]
    fn test_catalog_rejects_empty_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"X200": {{"artifacts": [], "credit_cost": 1}}}}"#).unwrap();
        assert!(DeviceCatalog::from_json_file(file.path()).is_err());
    }
}
