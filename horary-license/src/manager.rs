//! LicenseManager: read, decode, verify, check, memoize.
//!
//! Central authority for license validity. One instance is shared per
//! process; every caller goes through it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::artifact;
use crate::cache::{CacheEntry, LicenseCache};
use crate::config::LicenseConfig;
use crate::gate;
use crate::grant::TemporalError;
use crate::result::{InvalidReason, LicenseStatus, ValidationResult};
use crate::source::{ArtifactSource, FileSource, SourceError};
use crate::verifier::LicensePublicKey;

/// Thread-safe license authority with a TTL cache.
pub struct LicenseManager {
    source: Box<dyn ArtifactSource>,
    public_key: LicensePublicKey,
    cache: LicenseCache,
    expiry_warning_days: u32,
}

impl LicenseManager {
    /// Manager reading the configured file, verified with the embedded key.
    #[must_use]
    pub fn new(config: &LicenseConfig) -> Self {
        Self::with_public_key(config, LicensePublicKey::embedded())
    }

    /// Manager reading the configured file, verified with `public_key`.
    #[must_use]
    pub fn with_public_key(config: &LicenseConfig, public_key: LicensePublicKey) -> Self {
        let source = FileSource::new(&config.license_path, config.read_timeout());
        Self::with_source(Box::new(source), public_key, config)
    }

    /// Manager over an arbitrary artifact source.
    #[must_use]
    pub fn with_source(
        source: Box<dyn ArtifactSource>,
        public_key: LicensePublicKey,
        config: &LicenseConfig,
    ) -> Self {
        Self {
            source,
            public_key,
            cache: LicenseCache::new(config.cache_ttl()),
            expiry_warning_days: config.expiry_warning_days,
        }
    }

    /// Returns the current validation result.
    ///
    /// A cached result younger than the TTL is returned unchanged unless
    /// `force_reload` is set. Otherwise the artifact is re-read and the new
    /// result replaces the cached one.
    pub fn validate_license(&self, force_reload: bool) -> ValidationResult {
        if !force_reload {
            if let Some(entry) = self.cache.fresh() {
                debug!("License cache hit");
                return entry.result;
            }
        }

        let _refresh = self.cache.lock_refresh();

        // Another caller may have refreshed while we waited for the lock.
        if !force_reload {
            if let Some(entry) = self.cache.fresh() {
                debug!("License cache filled by concurrent validation");
                return entry.result;
            }
        }

        let result = self.compute(Utc::now());
        self.cache.store(CacheEntry::new(result.clone(), force_reload));
        result
    }

    /// Status view of the last result, validating first if none exists.
    pub fn get_license_status(&self) -> LicenseStatus {
        let entry = match self.cache.current() {
            Some(entry) => entry,
            None => {
                self.validate_license(false);
                match self.cache.current() {
                    Some(entry) => entry,
                    // Only reachable if invalidated concurrently.
                    None => {
                        return LicenseStatus::project(
                            &ValidationResult::Invalid(InvalidReason::Unreadable),
                            None,
                        );
                    }
                }
            }
        };
        LicenseStatus::project(&entry.result, Some(entry.checked_at))
    }

    /// True iff the current license is valid and includes `feature`.
    pub fn is_feature_available(&self, feature: &str) -> bool {
        gate::is_feature_available(feature, &self.validate_license(false))
    }

    /// The cached entry, without validating.
    #[must_use]
    pub fn cached_entry(&self) -> Option<CacheEntry> {
        self.cache.current()
    }

    /// Drops the cached result; the next call re-reads the artifact.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// The trust anchor this manager verifies against.
    #[must_use]
    pub fn public_key(&self) -> LicensePublicKey {
        self.public_key
    }

    /// Where the artifact is read from.
    #[must_use]
    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    fn compute(&self, now: DateTime<Utc>) -> ValidationResult {
        let result = self.evaluate(now);
        match &result {
            ValidationResult::Valid {
                grant,
                days_remaining,
            } => {
                info!(
                    licensed_to = %grant.licensed_to,
                    license_type = grant.license_type.as_str(),
                    license_id = %grant.license_id,
                    features = grant.features.len(),
                    days_remaining,
                    "License valid"
                );
                if *days_remaining <= self.expiry_warning_days {
                    warn!(days_remaining, "License expires in {days_remaining} days");
                }
            }
            ValidationResult::Invalid(reason) => {
                warn!(
                    reason = reason.code(),
                    source = %self.source.describe(),
                    "License validation failed"
                );
            }
        }
        result
    }

    fn evaluate(&self, now: DateTime<Utc>) -> ValidationResult {
        let bytes = match self.source.read() {
            Ok(bytes) => bytes,
            Err(SourceError::Missing) => {
                return ValidationResult::Invalid(InvalidReason::MissingFile);
            }
            Err(SourceError::Unreadable(e)) => {
                debug!(error = %e, "License artifact unreadable");
                return ValidationResult::Invalid(InvalidReason::Unreadable);
            }
        };

        let decoded = match artifact::decode(&bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "License artifact malformed");
                return ValidationResult::Invalid(InvalidReason::Malformed);
            }
        };

        // Decoding only checked payload shape; no field is trusted before this point.
        let Some(grant) = decoded.into_verified(&self.public_key) else {
            return ValidationResult::Invalid(InvalidReason::SignatureMismatch);
        };

        match grant.check_validity_at(now) {
            Ok(days_remaining) => ValidationResult::Valid {
                grant: Arc::new(grant),
                days_remaining,
            },
            Err(TemporalError::NotYetValid) => ValidationResult::Invalid(InvalidReason::NotYetValid),
            Err(TemporalError::Expired) => ValidationResult::Invalid(InvalidReason::Expired),
        }
    }
}

impl std::fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseManager")
            .field("source", &self.source.describe())
            .field("ttl", &self.cache.ttl())
            .finish_non_exhaustive()
    }
}
