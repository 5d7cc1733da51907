//! Ed25519 signature verification against the embedded trust anchor.

use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

use crate::error::{LicenseError, LicenseResult};

/// Algorithm tag written in artifact headers.
pub const ED25519_TAG: &str = "ed25519";

/// Embedded Ed25519 public key for production license verification (32 bytes).
const LICENSE_PUBLIC_KEY: [u8; PUBLIC_KEY_LENGTH] = [
    12, 179, 168, 215, 152, 110, 128, 50, 253, 145, 119, 51, 192, 106, 132, 248,
    105, 96, 55, 45, 190, 59, 100, 81, 128, 166, 25, 84, 198, 74, 102, 234,
];

/// Signature algorithms an artifact header can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Ed25519,
}

impl SignatureAlgorithm {
    /// Resolves a header tag. Unknown tags yield `None`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            ED25519_TAG => Some(Self::Ed25519),
            _ => None,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ed25519 => ED25519_TAG,
        }
    }
}

/// The trust anchor used to verify licenses.
///
/// Only ever built from bytes compiled into the binary or handed in by code;
/// a license artifact can never supply its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicensePublicKey(VerifyingKey);

impl LicensePublicKey {
    /// The production key compiled into this build.
    #[must_use]
    pub fn embedded() -> Self {
        // The constant is a known-good curve point.
        match VerifyingKey::from_bytes(&LICENSE_PUBLIC_KEY) {
            Ok(key) => Self(key),
            Err(_) => unreachable!("embedded license key is not a valid Ed25519 point"),
        }
    }

    /// Builds a key from raw bytes (tests and custom builds).
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> LicenseResult<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| LicenseError::InvalidKey("not a valid Ed25519 public key".to_string()))
    }

    /// Returns the raw 32-byte public key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }
}

impl From<VerifyingKey> for LicensePublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

/// Verifies `signature` over `message` with `public_key`.
///
/// Any mismatch (unknown algorithm tag, wrong signature length, bad
/// signature) returns `false`. Uses strict verification so malleable
/// encodings of a valid signature are rejected as well.
#[must_use]
pub fn verify(
    algorithm: &str,
    message: &[u8],
    signature: &[u8],
    public_key: &LicensePublicKey,
) -> bool {
    match SignatureAlgorithm::from_tag(algorithm) {
        Some(SignatureAlgorithm::Ed25519) => {}
        None => return false,
    }

    let Ok(bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    let signature = Signature::from_bytes(&bytes);

    public_key.0.verify_strict(message, &signature).is_ok()
}
