//! Feature gating on top of the current validation result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Enforcement, FeaturePolicy};
use crate::manager::LicenseManager;
use crate::result::{InvalidReason, ValidationResult};

/// Reason code for a valid license that lacks the requested feature.
pub const FEATURE_NOT_ENTITLED: &str = "feature_not_entitled";

/// True iff `result` is valid and its grant contains `feature`.
///
/// Unknown feature ids are indistinguishable from ones the grant lacks.
#[must_use]
pub fn is_feature_available(feature: &str, result: &ValidationResult) -> bool {
    result.grant().is_some_and(|grant| grant.has_feature(feature))
}

/// Successful gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// The license is valid and covers the request.
    Granted,
    /// The license is valid, the feature is not entitled, and policy allows
    /// running without it.
    Degraded { feature: String },
}

impl Access {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Which kind of denial this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// There is no valid license at all.
    NoValidLicense(InvalidReason),
    /// The license is valid but does not include the feature.
    FeatureNotEntitled,
}

/// Structured rejection of a protected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    pub feature: Option<String>,
    /// Features the current license does include (empty without a license).
    pub available_features: Vec<String>,
}

impl Denial {
    /// Machine-readable reason code shown to callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.kind {
            DenialKind::NoValidLicense(reason) => reason.public_code(),
            DenialKind::FeatureNotEntitled => FEATURE_NOT_ENTITLED,
        }
    }

    /// Human-readable message shown to callers.
    #[must_use]
    pub fn message(&self) -> String {
        match (&self.kind, &self.feature) {
            (DenialKind::NoValidLicense(reason), _) => {
                format!("Invalid or expired license: {}", reason.public_message())
            }
            (DenialKind::FeatureNotEntitled, Some(feature)) => {
                format!("Feature not available in current license: {feature}")
            }
            (DenialKind::FeatureNotEntitled, None) => {
                "Feature not available in current license".to_string()
            }
        }
    }

    #[must_use]
    pub fn requires_license(&self) -> bool {
        matches!(self.kind, DenialKind::NoValidLicense(_))
    }
}

/// Authorizes protected operations against the manager's current result.
///
/// Holds no result of its own; every call goes through the manager.
pub struct FeatureGate {
    manager: Arc<LicenseManager>,
    policy: FeaturePolicy,
}

impl FeatureGate {
    #[must_use]
    pub fn new(manager: Arc<LicenseManager>, policy: FeaturePolicy) -> Self {
        Self { manager, policy }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<LicenseManager> {
        &self.manager
    }

    #[must_use]
    pub fn policy(&self) -> &FeaturePolicy {
        &self.policy
    }

    /// Shorthand for [`is_feature_available`] on the current result.
    #[must_use]
    pub fn is_feature_available(&self, feature: &str) -> bool {
        self.manager.is_feature_available(feature)
    }

    /// Requires a valid license and, when given, the named feature.
    pub fn authorize(&self, feature: Option<&str>) -> Result<Access, Denial> {
        let result = self.manager.validate_license(false);
        authorize_with(&result, feature, &self.policy)
    }
}

/// Gate decision for an already obtained `result`.
pub fn authorize_with(
    result: &ValidationResult,
    feature: Option<&str>,
    policy: &FeaturePolicy,
) -> Result<Access, Denial> {
    let grant = match result {
        ValidationResult::Valid { grant, .. } => grant,
        ValidationResult::Invalid(reason) => {
            return Err(Denial {
                kind: DenialKind::NoValidLicense(*reason),
                feature: feature.map(str::to_string),
                available_features: Vec::new(),
            });
        }
    };

    let Some(feature) = feature else {
        return Ok(Access::Granted);
    };
    if grant.has_feature(feature) {
        debug!(feature, "Feature authorized");
        return Ok(Access::Granted);
    }

    match policy.enforcement(feature) {
        Enforcement::Degrade => {
            warn!(feature, "Feature not available in license, degrading");
            Ok(Access::Degraded {
                feature: feature.to_string(),
            })
        }
        Enforcement::Deny => Err(Denial {
            kind: DenialKind::FeatureNotEntitled,
            feature: Some(feature.to_string()),
            available_features: grant.features.iter().cloned().collect(),
        }),
    }
}
