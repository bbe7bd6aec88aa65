//! Payload configuration
//!
//! Read-only flags that shape how a software selection is checked and
//! installed. Stored as JSON; every field has a default so partial files
//! are accepted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::PayloadError;

/// Payload configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Package spec added to every selection unless excluded
    pub kernel_package: String,
    /// Does the product allow installing with broken packages at all?
    pub enable_ignore_broken_packages: bool,
    /// Install even if some specs are missing
    pub missing_ignored: bool,
    /// Install even if some specs are broken
    pub broken_ignored: bool,
    /// Installing onto real hardware (as opposed to an image or a
    /// container). Only hardware targets get the kernel package.
    pub hardware_target: bool,
    /// How long front ends wait for a selection check
    pub check_timeout_secs: u64,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            kernel_package: "kernel".to_string(),
            enable_ignore_broken_packages: false,
            missing_ignored: false,
            broken_ignored: false,
            hardware_target: true,
            check_timeout_secs: 60,
        }
    }
}

impl PayloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize payload configuration to JSON")?;

        fs::write(&path, json).with_context(|| {
            format!("Failed to write payload configuration to {:?}", path.as_ref())
        })?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read payload configuration from {:?}", path.as_ref())
        })?;

        let config: Self = serde_json::from_str(&content)
            .context("Failed to parse payload configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.kernel_package.trim().is_empty() {
            return Err(PayloadError::config("Kernel package must be specified"));
        }

        if self.kernel_package.contains(char::is_whitespace) {
            return Err(PayloadError::config(
                "Kernel package must be a single package spec",
            ));
        }

        if self.broken_ignored && !self.enable_ignore_broken_packages {
            return Err(PayloadError::config(
                "Ignoring broken packages is not allowed on this product",
            ));
        }

        if self.check_timeout_secs == 0 {
            return Err(PayloadError::config(
                "Selection check timeout must be at least one second",
            ));
        }

        Ok(())
    }

    /// Are broken packages tolerated during the installation?
    pub fn ignore_broken_packages(&self) -> bool {
        self.broken_ignored && self.enable_ignore_broken_packages
    }

    /// Kernel spec required by the target, if any.
    pub fn kernel_spec(&self) -> Option<&str> {
        self.hardware_target.then_some(self.kernel_package.as_str())
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = PayloadConfig::default();
        assert_eq!(config.kernel_package, "kernel");
        assert!(!config.missing_ignored);
        assert!(!config.ignore_broken_packages());
        assert!(config.hardware_target);
        assert_eq!(config.check_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_json_config() {
        let config = PayloadConfig {
            kernel_package: "kernel-rt".to_string(),
            missing_ignored: true,
            ..Default::default()
        };

        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();

        let loaded = PayloadConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(br#"{"missing_ignored": true}"#).unwrap();
        temp_file.flush().unwrap();

        let loaded = PayloadConfig::load_from_file(temp_file.path()).unwrap();
        assert!(loaded.missing_ignored);
        assert_eq!(loaded.kernel_package, "kernel");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = PayloadConfig::load_from_file(Path::new("/nonexistent/payload.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ invalid json }").unwrap();
        temp_file.flush().unwrap();

        let err = PayloadConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }

    #[test]
    fn test_validation_empty_kernel() {
        let config = PayloadConfig {
            kernel_package: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PayloadError::Config(_))));
    }

    #[test]
    fn test_validation_broken_ignored_requires_product_support() {
        let mut config = PayloadConfig {
            broken_ignored: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(!config.ignore_broken_packages());

        config.enable_ignore_broken_packages = true;
        assert!(config.validate().is_ok());
        assert!(config.ignore_broken_packages());
    }

    #[test]
    fn test_kernel_spec_follows_target() {
        let mut config = PayloadConfig::default();
        assert_eq!(config.kernel_spec(), Some("kernel"));

        config.hardware_target = false;
        assert_eq!(config.kernel_spec(), None);
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = PayloadConfig {
            check_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
