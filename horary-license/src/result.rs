//! Validation outcomes and the status view derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grant::{LicenseGrant, KNOWN_FEATURES};

/// Why a license is not valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    MissingFile,
    Unreadable,
    Malformed,
    SignatureMismatch,
    Expired,
    NotYetValid,
}

impl InvalidReason {
    /// Precise reason code, for logs and diagnostics.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "missing_file",
            Self::Unreadable => "unreadable",
            Self::Malformed => "malformed",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
        }
    }

    /// Reason code safe to show to callers.
    ///
    /// `malformed` and `signature_mismatch` collapse into `invalid_license`
    /// so a forger cannot tell which check rejected a crafted artifact.
    #[must_use]
    pub fn public_code(&self) -> &'static str {
        match self {
            Self::Malformed | Self::SignatureMismatch => "invalid_license",
            other => other.code(),
        }
    }

    /// Message safe to show to callers.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingFile => "no license file is installed",
            Self::Unreadable => "the license file could not be read",
            Self::Malformed | Self::SignatureMismatch => "invalid license",
            Self::Expired => "the license has expired",
            Self::NotYetValid => "the license is not valid yet",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid {
        grant: Arc<LicenseGrant>,
        days_remaining: u32,
    },
    Invalid(InvalidReason),
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The grant, if the result is valid.
    #[must_use]
    pub fn grant(&self) -> Option<&LicenseGrant> {
        match self {
            Self::Valid { grant, .. } => Some(grant.as_ref()),
            Self::Invalid(_) => None,
        }
    }

    #[must_use]
    pub fn days_remaining(&self) -> u32 {
        match self {
            Self::Valid { days_remaining, .. } => *days_remaining,
            Self::Invalid(_) => 0,
        }
    }

    #[must_use]
    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}

/// Externally reported license status (JSON, camelCase).
///
/// A pure projection of the last [`ValidationResult`]; it holds no state of
/// its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    pub valid: bool,
    pub licensed_to: Option<String>,
    pub license_type: Option<String>,
    pub days_remaining: u32,
    pub features: BTreeMap<String, bool>,
    pub feature_count: usize,
    pub last_checked: Option<DateTime<Utc>>,
    /// Public reason code when the license is not valid.
    pub reason: Option<String>,
}

impl LicenseStatus {
    /// Projects `result`, computed at `last_checked`, into a status view.
    #[must_use]
    pub fn project(result: &ValidationResult, last_checked: Option<DateTime<Utc>>) -> Self {
        let mut features: BTreeMap<String, bool> = KNOWN_FEATURES
            .iter()
            .map(|f| ((*f).to_string(), false))
            .collect();

        match result {
            ValidationResult::Valid {
                grant,
                days_remaining,
            } => {
                for feature in &grant.features {
                    features.insert(feature.clone(), true);
                }
                Self {
                    valid: true,
                    licensed_to: Some(grant.licensed_to.clone()),
                    license_type: Some(grant.license_type.as_str().to_string()),
                    days_remaining: *days_remaining,
                    features,
                    feature_count: grant.features.len(),
                    last_checked,
                    reason: None,
                }
            }
            ValidationResult::Invalid(reason) => Self {
                valid: false,
                licensed_to: None,
                license_type: None,
                days_remaining: 0,
                features,
                feature_count: 0,
                last_checked,
                reason: Some(reason.public_code().to_string()),
            },
        }
    }

    /// Entitled feature ids, in order.
    #[must_use]
    pub fn entitled_features(&self) -> Vec<String> {
        self.features
            .iter()
            .filter(|(_, entitled)| **entitled)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
