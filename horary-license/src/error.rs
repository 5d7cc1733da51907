//! Error types for the licensing module.
//!
//! None of these cross the [`LicenseManager`](crate::LicenseManager) boundary:
//! the manager folds every fault into a [`ValidationResult`](crate::ValidationResult).

use thiserror::Error;

/// Structural failures while decoding a license artifact.
///
/// Every variant maps to the `malformed` validation outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The `hlic` marker is missing or the section count is wrong.
    #[error("invalid artifact structure: {0}")]
    InvalidStructure(String),

    /// The artifact declares a format version this build does not read.
    #[error("unsupported artifact format version: {0}")]
    UnsupportedFormat(String),

    /// A section is not valid unpadded base64url.
    #[error("invalid artifact encoding: {0}")]
    InvalidEncoding(String),

    /// Payload JSON is malformed or missing required fields.
    #[error("invalid license payload: {0}")]
    InvalidPayload(String),

    /// The payload schema version is unknown.
    #[error("unsupported payload schema version: {0}")]
    UnsupportedSchema(u32),
}

/// Errors raised by configuration loading and license issuance.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Configuration file could not be parsed.
    #[error("invalid license configuration: {0}")]
    Config(String),

    /// Key material has the wrong shape.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The grant cannot be issued as given.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// An artifact failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Signature did not verify against the supplied public key.
    #[error("license signature invalid")]
    InvalidSignature,

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
