//! Issuer side: key generation, signing and inspection of artifacts.
//!
//! Only used by the license tool and tests. The service itself never holds a
//! signing key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;

use crate::artifact;
use crate::error::{LicenseError, LicenseResult};
use crate::grant::{LicenseGrant, LicenseType};
use crate::verifier::LicensePublicKey;

/// Holder of the private half of the licensing key pair.
pub struct LicenseIssuer {
    signing_key: SigningKey,
}

impl LicenseIssuer {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates an issuer from a raw 32-byte secret.
    #[must_use]
    pub fn from_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Creates an issuer from a base64-encoded 32-byte secret.
    pub fn from_base64(secret: &str) -> LicenseResult<Self> {
        let bytes = BASE64
            .decode(secret.trim())
            .map_err(|e| LicenseError::InvalidKey(format!("invalid secret base64: {e}")))?;
        let secret: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| LicenseError::InvalidKey("secret key must be 32 bytes".to_string()))?;
        Ok(Self::from_bytes(&secret))
    }

    /// The base64-encoded secret key.
    #[must_use]
    pub fn secret_base64(&self) -> String {
        BASE64.encode(self.signing_key.to_bytes())
    }

    /// The public half, for verification.
    #[must_use]
    pub fn public_key(&self) -> LicensePublicKey {
        LicensePublicKey::from(self.signing_key.verifying_key())
    }

    /// The base64-encoded public key.
    #[must_use]
    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public_key().to_bytes())
    }

    /// Signs `grant` into an artifact string.
    pub fn issue(&self, grant: &LicenseGrant) -> LicenseResult<String> {
        artifact::encode(grant, &self.signing_key).map_err(|e| LicenseError::InvalidGrant(e.to_string()))
    }

    /// Builds and signs a grant valid from `issued_at` for `valid_for`.
    pub fn issue_for(
        &self,
        licensed_to: &str,
        license_type: LicenseType,
        issued_at: DateTime<Utc>,
        valid_for: Duration,
        features: &[String],
    ) -> LicenseResult<(LicenseGrant, String)> {
        if valid_for <= Duration::zero() {
            return Err(LicenseError::InvalidGrant(
                "validity period must be positive".to_string(),
            ));
        }
        let grant = LicenseGrant::new(
            licensed_to,
            license_type,
            issued_at,
            issued_at + valid_for,
            features.iter().cloned(),
        );
        let artifact = self.issue(&grant)?;
        Ok((grant, artifact))
    }
}

/// Parses a base64-encoded 32-byte public key.
pub fn public_key_from_base64(public: &str) -> LicenseResult<LicensePublicKey> {
    let bytes = BASE64
        .decode(public.trim())
        .map_err(|e| LicenseError::InvalidKey(format!("invalid public key base64: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| LicenseError::InvalidKey("public key must be 32 bytes".to_string()))?;
    LicensePublicKey::from_bytes(&bytes)
}

/// Decodes and verifies an artifact, returning its grant.
///
/// Unlike the manager this reports the precise failure and does not check
/// the validity window.
pub fn inspect(artifact_bytes: &[u8], public_key: &LicensePublicKey) -> LicenseResult<LicenseGrant> {
    let decoded = artifact::decode(artifact_bytes)?;
    decoded
        .into_verified(public_key)
        .ok_or(LicenseError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_roundtrip_preserves_public_key() {
        let issuer = LicenseIssuer::generate();
        let restored = LicenseIssuer::from_base64(&issuer.secret_base64()).unwrap();
        assert_eq!(issuer.public_key(), restored.public_key());
        assert_eq!(
            public_key_from_base64(&issuer.public_base64()).unwrap(),
            issuer.public_key()
        );
    }

    #[test]
    fn short_secret_rejected() {
        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            LicenseIssuer::from_base64(&short),
            Err(LicenseError::InvalidKey(_))
        ));
    }

    #[test]
    fn issue_then_inspect() {
        let issuer = LicenseIssuer::generate();
        let (grant, artifact) = issuer
            .issue_for(
                "Lilly & Co",
                LicenseType::Premium,
                Utc::now(),
                Duration::days(365),
                &["enhanced_engine".to_string(), "override_flags".to_string()],
            )
            .unwrap();
        let inspected = inspect(artifact.as_bytes(), &issuer.public_key()).unwrap();
        assert_eq!(inspected, grant);
    }

    #[test]
    fn inspect_with_other_key_fails() {
        let issuer = LicenseIssuer::generate();
        let (_, artifact) = issuer
            .issue_for("x", LicenseType::Trial, Utc::now(), Duration::days(14), &[])
            .unwrap();
        let other = LicenseIssuer::generate();
        assert!(matches!(
            inspect(artifact.as_bytes(), &other.public_key()),
            Err(LicenseError::InvalidSignature)
        ));
    }

    #[test]
    fn non_positive_validity_rejected() {
        let issuer = LicenseIssuer::generate();
        assert!(issuer
            .issue_for("x", LicenseType::Trial, Utc::now(), Duration::zero(), &[])
            .is_err());
    }
}
