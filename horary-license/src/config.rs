//! License configuration, read from `license.toml`.
//!
//! ```toml
//! license_path = "/etc/horary/license.hlic"
//! cache_ttl_secs = 300
//! read_timeout_secs = 5
//! expiry_warning_days = 30
//!
//! [policy]
//! default = "deny"
//!
//! [policy.features]
//! future_retrograde = "degrade"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LicenseError, LicenseResult};

/// Environment variable that overrides the configured license path.
pub const LICENSE_PATH_ENV: &str = "HORARY_LICENSE_PATH";

/// File name of the default license artifact.
pub const DEFAULT_LICENSE_FILE: &str = "license.hlic";

/// What to do when a valid license lacks a requested feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Reject the operation.
    #[default]
    Deny,
    /// Run the operation without the feature and log a warning.
    Degrade,
}

/// Per-feature enforcement with a uniform default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePolicy {
    #[serde(default)]
    pub default: Enforcement,
    #[serde(default)]
    pub features: HashMap<String, Enforcement>,
}

impl FeaturePolicy {
    /// Enforcement for `feature`, falling back to the default.
    #[must_use]
    pub fn enforcement(&self, feature: &str) -> Enforcement {
        self.features.get(feature).copied().unwrap_or(self.default)
    }

    /// Sets the enforcement for one feature.
    #[must_use]
    pub fn with(mut self, feature: impl Into<String>, enforcement: Enforcement) -> Self {
        self.features.insert(feature.into(), enforcement);
        self
    }
}

/// Settings for the license subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseConfig {
    #[serde(default = "default_license_path")]
    pub license_path: PathBuf,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: u32,
    #[serde(default)]
    pub policy: FeaturePolicy,
}

fn default_license_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("horary")
        .join(DEFAULT_LICENSE_FILE)
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_read_timeout_secs() -> u64 {
    5
}

fn default_expiry_warning_days() -> u32 {
    30
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            license_path: default_license_path(),
            cache_ttl_secs: default_cache_ttl_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            expiry_warning_days: default_expiry_warning_days(),
            policy: FeaturePolicy::default(),
        }
    }
}

impl LicenseConfig {
    /// A default configuration pointing at `license_path`.
    #[must_use]
    pub fn for_path(license_path: impl Into<PathBuf>) -> Self {
        Self {
            license_path: license_path.into(),
            ..Self::default()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> LicenseResult<Self> {
        toml::from_str(content).map_err(|e| LicenseError::Config(e.to_string()))
    }

    /// Loads the config file at `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> LicenseResult<Self> {
        if !path.exists() {
            info!("No license config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded license config from {}", path.display());
        Ok(config)
    }

    /// Applies `HORARY_LICENSE_PATH` if it is set and non-empty.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        match std::env::var(LICENSE_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                self.license_path = PathBuf::from(path.trim());
            }
            Ok(_) => warn!("{LICENSE_PATH_ENV} is set but empty, ignoring"),
            Err(_) => {}
        }
        self
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
