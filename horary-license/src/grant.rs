//! The decoded license grant and its temporal rules.
//!
//! The payload is a JSON object with camelCase keys:
//! - `schemaVersion`: payload schema version (currently `1`)
//! - `licenseId`: audit identifier, not a secret
//! - `licensedTo`: licensee identity
//! - `licenseType`: `trial`, `standard`, `professional` or `premium`
//! - `issuedAt` / `expiresAt`: RFC 3339 UTC instants
//! - `features`: entitled feature ids

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;

/// Payload schema version understood by this build.
pub const SCHEMA_VERSION: u32 = 1;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Feature ids the service knows how to gate.
///
/// Only used to render status reports; entitlement is always membership in
/// [`LicenseGrant::features`].
pub const KNOWN_FEATURES: [&str; 5] = [
    "enhanced_engine",
    "timezone_support",
    "moon_analysis",
    "override_flags",
    "future_retrograde",
];

/// The license tier recorded in a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Limited-time evaluation.
    Trial,
    /// Standard subscription.
    Standard,
    /// Professional subscription.
    Professional,
    /// Premium subscription (override flags and every analysis feature).
    Premium,
}

impl LicenseType {
    /// Lowercase tag used on the wire and in status reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Standard => "standard",
            Self::Professional => "professional",
            Self::Premium => "premium",
        }
    }
}

/// Decoded license terms.
///
/// A grant is only handed out by the codec after its signature verified, so
/// holding one means its fields can be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LicenseGrant {
    pub schema_version: u32,
    pub license_id: Uuid,
    pub licensed_to: String,
    pub license_type: LicenseType,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub features: BTreeSet<String>,
}

/// Why a verified grant is not usable at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalError {
    /// `now` is before `issuedAt`.
    NotYetValid,
    /// `now` is after `expiresAt`.
    Expired,
}

impl LicenseGrant {
    /// Creates a grant with the current schema version and a fresh license id.
    #[must_use]
    pub fn new(
        licensed_to: impl Into<String>,
        license_type: LicenseType,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        features: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            license_id: Uuid::now_v7(),
            licensed_to: licensed_to.into(),
            license_type,
            issued_at,
            expires_at,
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a payload and checks the schema rules that do not depend on time.
    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        // Check the version first so a future schema is reported as such
        // instead of as a field mismatch.
        let probe: SchemaProbe = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::InvalidPayload(format!("invalid payload JSON: {e}")))?;
        if probe.schema_version != SCHEMA_VERSION {
            return Err(DecodeError::UnsupportedSchema(probe.schema_version));
        }

        let grant: Self = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::InvalidPayload(format!("invalid payload JSON: {e}")))?;
        grant.check_structure()?;
        Ok(grant)
    }

    /// Serializes the grant into the payload bytes that get signed.
    pub fn to_payload(&self) -> Result<Vec<u8>, DecodeError> {
        self.check_structure()?;
        serde_json::to_vec(self).map_err(|e| DecodeError::InvalidPayload(e.to_string()))
    }

    fn check_structure(&self) -> Result<(), DecodeError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(DecodeError::UnsupportedSchema(self.schema_version));
        }
        if self.licensed_to.trim().is_empty() {
            return Err(DecodeError::InvalidPayload("licensedTo is empty".to_string()));
        }
        if self.expires_at <= self.issued_at {
            return Err(DecodeError::InvalidPayload(
                "expiresAt must be after issuedAt".to_string(),
            ));
        }
        if self.features.iter().any(|f| f.trim().is_empty()) {
            return Err(DecodeError::InvalidPayload("empty feature id".to_string()));
        }
        Ok(())
    }

    /// Returns true if the grant entitles `feature`.
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Checks the validity window at `now` and returns the days remaining.
    ///
    /// Days remaining are `ceil((expiresAt - now) / 1 day)`, floored at 0.
    pub fn check_validity_at(&self, now: DateTime<Utc>) -> Result<u32, TemporalError> {
        if now < self.issued_at {
            return Err(TemporalError::NotYetValid);
        }
        if now > self.expires_at {
            return Err(TemporalError::Expired);
        }
        Ok(days_remaining(self.expires_at, now))
    }
}

/// `ceil((expires_at - now) / 1 day)`, floored at 0.
#[must_use]
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let ms = (expires_at - now).num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    let days = (ms + MS_PER_DAY - 1) / MS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaProbe {
    schema_version: u32,
}
