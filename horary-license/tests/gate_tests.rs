mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{manager_over, valid_artifact, CountingSource};
use horary_license::{
    authorize_with, is_feature_available, Access, DenialKind, Enforcement, FeatureGate,
    FeaturePolicy, InvalidReason, LicenseGrant, LicenseType, ValidationResult,
    FEATURE_NOT_ENTITLED,
};

fn valid_result(features: &[&str]) -> ValidationResult {
    let now = chrono::Utc::now();
    let grant = LicenseGrant::new(
        "Gate Test",
        LicenseType::Standard,
        now - chrono::Duration::days(1),
        now + chrono::Duration::days(10),
        features.iter().copied(),
    );
    ValidationResult::Valid {
        grant: Arc::new(grant),
        days_remaining: 10,
    }
}

const ALL_REASONS: [InvalidReason; 6] = [
    InvalidReason::MissingFile,
    InvalidReason::Unreadable,
    InvalidReason::Malformed,
    InvalidReason::SignatureMismatch,
    InvalidReason::Expired,
    InvalidReason::NotYetValid,
];

// ── Predicate ────────────────────────────────────────────────────

#[test]
fn available_only_when_valid_and_entitled() {
    let result = valid_result(&["x", "enhanced_engine"]);
    assert!(is_feature_available("x", &result));
    assert!(is_feature_available("enhanced_engine", &result));
    assert!(!is_feature_available("override_flags", &result));
}

#[test]
fn unknown_feature_is_just_absent() {
    let result = valid_result(&["enhanced_engine"]);
    assert!(!is_feature_available("no_such_feature", &result));
    assert!(!is_feature_available("", &result));
}

#[test]
fn never_available_without_valid_license() {
    for reason in ALL_REASONS {
        let result = ValidationResult::Invalid(reason);
        assert!(!is_feature_available("x", &result), "{reason} leaked a feature");
    }
}

// ── Authorization ────────────────────────────────────────────────

#[test]
fn no_feature_requested_needs_only_validity() {
    let result = valid_result(&[]);
    assert_eq!(
        authorize_with(&result, None, &FeaturePolicy::default()),
        Ok(Access::Granted)
    );
}

#[test]
fn invalid_license_is_denied_regardless_of_policy() {
    let lenient = FeaturePolicy {
        default: Enforcement::Degrade,
        ..FeaturePolicy::default()
    };
    for reason in ALL_REASONS {
        let denial = authorize_with(&ValidationResult::Invalid(reason), Some("x"), &lenient)
            .unwrap_err();
        assert_eq!(denial.kind, DenialKind::NoValidLicense(reason));
        assert!(denial.requires_license());
        assert!(denial.available_features.is_empty());
    }
}

#[test]
fn denial_codes_hide_forgery_detail() {
    let policy = FeaturePolicy::default();
    let code = |reason| {
        authorize_with(&ValidationResult::Invalid(reason), None, &policy)
            .unwrap_err()
            .code()
    };
    assert_eq!(code(InvalidReason::Malformed), "invalid_license");
    assert_eq!(code(InvalidReason::SignatureMismatch), "invalid_license");
    assert_eq!(code(InvalidReason::Expired), "expired");
    assert_eq!(code(InvalidReason::NotYetValid), "not_yet_valid");
    assert_eq!(code(InvalidReason::MissingFile), "missing_file");
    assert_eq!(code(InvalidReason::Unreadable), "unreadable");
}

#[test]
fn missing_feature_is_denied_by_default() {
    let result = valid_result(&["enhanced_engine"]);
    let denial = authorize_with(&result, Some("override_flags"), &FeaturePolicy::default())
        .unwrap_err();
    assert_eq!(denial.kind, DenialKind::FeatureNotEntitled);
    assert_eq!(denial.code(), FEATURE_NOT_ENTITLED);
    assert_eq!(denial.feature.as_deref(), Some("override_flags"));
    assert_eq!(denial.available_features, vec!["enhanced_engine".to_string()]);
    assert!(!denial.requires_license());
    assert!(denial.message().contains("override_flags"));
}

#[test]
fn degrade_policy_lets_operation_continue() {
    let policy = FeaturePolicy::default().with("future_retrograde", Enforcement::Degrade);
    let result = valid_result(&["enhanced_engine"]);

    let access = authorize_with(&result, Some("future_retrograde"), &policy).unwrap();
    assert_eq!(
        access,
        Access::Degraded {
            feature: "future_retrograde".to_string()
        }
    );
    assert!(access.is_degraded());

    // Other features keep the default.
    assert!(authorize_with(&result, Some("override_flags"), &policy).is_err());
}

#[test]
fn entitled_feature_is_granted_even_when_degradable() {
    let policy = FeaturePolicy::default().with("future_retrograde", Enforcement::Degrade);
    let result = valid_result(&["future_retrograde"]);
    assert_eq!(
        authorize_with(&result, Some("future_retrograde"), &policy),
        Ok(Access::Granted)
    );
}

// ── FeatureGate over a manager ───────────────────────────────────

#[test]
fn gate_reflects_forced_reload() {
    let (_, artifact) = valid_artifact(&["timezone_support"]);
    let source = CountingSource::new(&artifact);
    let manager = Arc::new(manager_over(&source, Duration::from_secs(3600)));
    let gate = FeatureGate::new(Arc::clone(&manager), FeaturePolicy::default());

    assert_eq!(gate.authorize(Some("timezone_support")), Ok(Access::Granted));
    assert!(gate.is_feature_available("timezone_support"));

    source.remove();
    manager.validate_license(true);

    let denial = gate.authorize(Some("timezone_support")).unwrap_err();
    assert_eq!(denial.kind, DenialKind::NoValidLicense(InvalidReason::MissingFile));
    assert!(!gate.is_feature_available("timezone_support"));
}

#[test]
fn gate_does_not_cache_on_its_own() {
    let (_, artifact) = valid_artifact(&["moon_analysis"]);
    let source = CountingSource::new(&artifact);
    let manager = Arc::new(manager_over(&source, Duration::ZERO));
    let gate = FeatureGate::new(Arc::clone(&manager), FeaturePolicy::default());

    assert!(gate.authorize(Some("moon_analysis")).is_ok());
    source.remove();
    // TTL of zero: the very next call sees the revocation.
    assert!(gate.authorize(Some("moon_analysis")).is_err());
    assert_eq!(source.reads(), 2);
}
