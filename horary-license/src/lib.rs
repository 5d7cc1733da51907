//! Offline licensing for the Horary API.
//!
//! This crate handles:
//! - Decoding signed license artifacts
//! - Ed25519 signature verification against an embedded public key
//! - Validity window checks and days-remaining computation
//! - A TTL cache shared by concurrent request handlers
//! - Feature gating with a configurable deny/degrade policy
//!
//! # Design Principles
//!
//! - **Offline only**: no network call is ever made to validate a license
//! - **Verify before trust**: no payload field is trusted before the signature holds
//! - **No faults past the manager**: callers only see [`ValidationResult`] variants
//!
//! # Artifact Format
//!
//! `hlic.v1.ed25519.<base64url(payload)>.<base64url(signature)>`, where the
//! signature covers everything before the last dot. See [`decode`].

mod artifact;
mod cache;
mod config;
mod error;
mod gate;
mod grant;
mod issuer;
mod manager;
mod result;
mod source;
mod verifier;

pub use artifact::{
    decode, encode, ArtifactMetadata, DecodedArtifact, ARTIFACT_MAGIC, FORMAT_VERSION,
};
pub use cache::{CacheEntry, LicenseCache};
pub use config::{
    Enforcement, FeaturePolicy, LicenseConfig, DEFAULT_LICENSE_FILE, LICENSE_PATH_ENV,
};
pub use error::{DecodeError, LicenseError, LicenseResult};
pub use gate::{
    authorize_with, is_feature_available, Access, Denial, DenialKind, FeatureGate,
    FEATURE_NOT_ENTITLED,
};
pub use grant::{days_remaining, LicenseGrant, LicenseType, TemporalError, KNOWN_FEATURES, SCHEMA_VERSION};
pub use issuer::{inspect, public_key_from_base64, LicenseIssuer};
pub use manager::LicenseManager;
pub use result::{InvalidReason, LicenseStatus, ValidationResult};
pub use source::{ArtifactSource, FileSource, MemorySource, SourceError};
pub use verifier::{verify, LicensePublicKey, SignatureAlgorithm, ED25519_TAG};
