mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use common::{
    grant_between, grant_expiring_in, manager_over, sign, test_keypair, valid_artifact,
    CountingSource,
};
use horary_license::{InvalidReason, LicenseConfig, LicenseManager, ValidationResult};
use pretty_assertions::assert_eq;

const LONG_TTL: Duration = Duration::from_secs(3600);

// ── Outcomes ─────────────────────────────────────────────────────

#[test]
fn valid_artifact_yields_valid_result() {
    let (grant, artifact) = valid_artifact(&["enhanced_engine", "timezone_support"]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);

    match manager.validate_license(false) {
        ValidationResult::Valid {
            grant: validated,
            days_remaining,
        } => {
            assert_eq!(validated.licensed_to, grant.licensed_to);
            assert_eq!(validated.features, grant.features);
            assert_eq!(days_remaining, 90);
        }
        other => panic!("expected Valid, got {other:?}"),
    }
}

#[test]
fn missing_artifact_is_missing_file() {
    let source = CountingSource::missing();
    let manager = manager_over(&source, LONG_TTL);
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::MissingFile)
    );
}

#[test]
fn garbage_artifact_is_malformed() {
    let source = CountingSource::new("definitely not a license");
    let manager = manager_over(&source, LONG_TTL);
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::Malformed)
    );
}

#[test]
fn foreign_signature_is_signature_mismatch() {
    let (_, artifact) = valid_artifact(&["enhanced_engine"]);
    let source = CountingSource::new(&artifact);
    let config = LicenseConfig::for_path("unused.hlic");
    // Production trust anchor, test-signed artifact.
    let manager = LicenseManager::with_source(
        Box::new(source),
        horary_license::LicensePublicKey::embedded(),
        &config,
    );
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::SignatureMismatch)
    );
}

#[test]
fn expired_artifact_is_expired() {
    let (sk, _) = test_keypair();
    let grant = grant_expiring_in(chrono::Duration::seconds(-1), &["enhanced_engine"]);
    let source = CountingSource::new(&sign(&sk, &grant));
    let manager = manager_over(&source, LONG_TTL);
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::Expired)
    );
}

#[test]
fn artifact_expiring_soon_is_still_valid() {
    let (sk, _) = test_keypair();
    let grant = grant_expiring_in(chrono::Duration::seconds(5), &["enhanced_engine"]);
    let source = CountingSource::new(&sign(&sk, &grant));
    let manager = manager_over(&source, LONG_TTL);
    let result = manager.validate_license(false);
    assert!(result.is_valid());
    assert_eq!(result.days_remaining(), 1);
}

#[test]
fn future_artifact_is_not_yet_valid() {
    let (sk, _) = test_keypair();
    let now = Utc::now();
    let grant = grant_between(
        now + chrono::Duration::hours(2),
        now + chrono::Duration::days(30),
        &[],
    );
    let source = CountingSource::new(&sign(&sk, &grant));
    let manager = manager_over(&source, LONG_TTL);
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::NotYetValid)
    );
}

#[test]
fn tampered_expired_artifact_reports_signature_not_expiry() {
    // Verification runs before the validity window is looked at.
    let (sk, _) = test_keypair();
    let grant = grant_expiring_in(chrono::Duration::days(-10), &[]);
    let artifact = sign(&sk, &grant);
    let (signed, sig) = artifact.rsplit_once('.').unwrap();
    let mut sig = sig.to_string();
    let replacement = if sig.starts_with('A') { "B" } else { "A" };
    sig.replace_range(0..1, replacement);
    let source = CountingSource::new(&format!("{signed}.{sig}"));
    let manager = manager_over(&source, LONG_TTL);
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::SignatureMismatch)
    );
}

#[test]
fn real_file_missing_then_present() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.hlic");
    let (_, pk) = test_keypair();
    let config = LicenseConfig::for_path(&path);
    let manager = LicenseManager::with_public_key(&config, pk);

    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::MissingFile)
    );

    let (_, artifact) = valid_artifact(&["moon_analysis"]);
    std::fs::write(&path, artifact).unwrap();
    assert!(manager.validate_license(true).is_valid());
}

#[cfg(unix)]
#[test]
fn stalled_artifact_read_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.hlic");
    let status = std::process::Command::new("mkfifo").arg(&path).status().unwrap();
    assert!(status.success());

    let (_, pk) = test_keypair();
    let mut config = LicenseConfig::for_path(&path);
    config.read_timeout_secs = 1;
    let manager = LicenseManager::with_public_key(&config, pk);

    let started = std::time::Instant::now();
    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::Unreadable)
    );
    assert!(started.elapsed() < Duration::from_secs(3));

    drop(std::fs::OpenOptions::new().write(true).open(&path).unwrap());
}

// ── Cache ────────────────────────────────────────────────────────

#[test]
fn cached_result_is_reused_within_ttl() {
    let (_, artifact) = valid_artifact(&["enhanced_engine"]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);

    let first = manager.validate_license(false);
    let second = manager.validate_license(false);

    assert_eq!(source.reads(), 1);
    match (&first, &second) {
        (ValidationResult::Valid { grant: a, .. }, ValidationResult::Valid { grant: b, .. }) => {
            assert!(Arc::ptr_eq(a, b));
        }
        other => panic!("expected two Valid results, got {other:?}"),
    }
    assert_eq!(first, second);
}

#[test]
fn force_reload_always_rereads() {
    let (_, artifact) = valid_artifact(&["enhanced_engine"]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);

    manager.validate_license(false);
    manager.validate_license(true);
    manager.validate_license(true);
    assert_eq!(source.reads(), 3);
    assert!(manager.cached_entry().unwrap().forced);
}

#[test]
fn zero_ttl_rereads_every_call() {
    let (_, artifact) = valid_artifact(&[]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, Duration::ZERO);

    manager.validate_license(false);
    manager.validate_license(false);
    assert_eq!(source.reads(), 2);
}

#[test]
fn rotation_is_seen_after_forced_reload() {
    let (_, artifact) = valid_artifact(&["enhanced_engine"]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);
    assert!(manager.is_feature_available("enhanced_engine"));

    source.remove();
    // Still cached.
    assert!(manager.is_feature_available("enhanced_engine"));

    assert_eq!(
        manager.validate_license(true),
        ValidationResult::Invalid(InvalidReason::MissingFile)
    );
    assert!(!manager.is_feature_available("enhanced_engine"));
}

#[test]
fn invalidate_forces_next_read() {
    let (_, artifact) = valid_artifact(&[]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);

    manager.validate_license(false);
    manager.invalidate();
    assert!(manager.cached_entry().is_none());
    manager.validate_license(false);
    assert_eq!(source.reads(), 2);
}

// ── Status ───────────────────────────────────────────────────────

#[test]
fn status_for_missing_file() {
    let source = CountingSource::missing();
    let manager = manager_over(&source, LONG_TTL);

    assert_eq!(
        manager.validate_license(false),
        ValidationResult::Invalid(InvalidReason::MissingFile)
    );
    let status = manager.get_license_status();
    assert!(!status.valid);
    assert_eq!(status.days_remaining, 0);
    assert_eq!(status.feature_count, 0);
    assert_eq!(status.reason.as_deref(), Some("missing_file"));
    assert!(status.features.values().all(|entitled| !entitled));
    assert_eq!(source.reads(), 1);
}

#[test]
fn status_validates_lazily() {
    let (_, artifact) = valid_artifact(&["enhanced_engine", "override_flags"]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);
    assert!(manager.cached_entry().is_none());

    let status = manager.get_license_status();
    assert_eq!(source.reads(), 1);
    assert!(status.valid);
    assert_eq!(status.licensed_to.as_deref(), Some("Test Observatory"));
    assert_eq!(status.license_type.as_deref(), Some("professional"));
    assert_eq!(status.feature_count, 2);
    assert_eq!(status.features.get("override_flags"), Some(&true));
    assert_eq!(status.features.get("moon_analysis"), Some(&false));
    assert!(status.last_checked.is_some());
}

#[test]
fn status_does_not_revalidate() {
    let (_, artifact) = valid_artifact(&[]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, Duration::ZERO);

    manager.validate_license(false);
    manager.get_license_status();
    manager.get_license_status();
    assert_eq!(source.reads(), 1);
}

#[test]
fn status_hides_signature_detail() {
    let source = CountingSource::new("hlic.v1.ed25519.e30.AAAA");
    let manager = manager_over(&source, LONG_TTL);
    let status = manager.get_license_status();
    assert_eq!(status.reason.as_deref(), Some("invalid_license"));
}

#[test]
fn status_serializes_camel_case() {
    let (_, artifact) = valid_artifact(&["timezone_support"]);
    let source = CountingSource::new(&artifact);
    let manager = manager_over(&source, LONG_TTL);
    let json = serde_json::to_value(manager.get_license_status()).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["featureCount"], 1);
    assert_eq!(json["daysRemaining"], 90);
    assert_eq!(json["features"]["timezone_support"], true);
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_cold_validations_read_once() {
    const CALLERS: usize = 16;
    let (_, artifact) = valid_artifact(&["enhanced_engine"]);
    let source = CountingSource::new(&artifact).with_delay(Duration::from_millis(20));
    let manager = Arc::new(manager_over(&source, LONG_TTL));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.validate_license(false)
            })
        })
        .collect();

    let results: Vec<ValidationResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(source.reads(), 1);
    for result in &results {
        assert_eq!(result, &results[0]);
        let grant = result.grant().unwrap();
        let expected = horary_license::days_remaining(grant.expires_at, Utc::now());
        assert!(result.days_remaining() == expected || result.days_remaining() == expected + 1);
    }
}

#[test]
fn concurrent_readers_during_forced_reloads_see_whole_results() {
    let (_, artifact) = valid_artifact(&["enhanced_engine"]);
    let source = CountingSource::new(&artifact);
    let manager = Arc::new(manager_over(&source, LONG_TTL));
    manager.validate_license(false);

    let writer = {
        let manager = Arc::clone(&manager);
        let source = source.clone();
        thread::spawn(move || {
            for i in 0..50 {
                if i % 2 == 0 {
                    source.remove();
                } else {
                    source.set(&artifact);
                }
                manager.validate_license(true);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..200 {
                    match manager.validate_license(false) {
                        ValidationResult::Valid { days_remaining, .. } => {
                            assert_eq!(days_remaining, 90);
                        }
                        ValidationResult::Invalid(reason) => {
                            assert_eq!(reason, InvalidReason::MissingFile);
                        }
                    }
                    let status = manager.get_license_status();
                    assert_eq!(status.valid, status.feature_count == 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
