//! License artifact codec.
//!
//! Artifacts are one line of text:
//!
//! ```text
//! hlic.v1.ed25519.<base64url(payload_json)>.<base64url(signature)>
//! ```
//!
//! The signature covers the ASCII bytes of everything before the last dot,
//! so the header (format version and algorithm tag) is authenticated along
//! with the payload.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signer, SigningKey};

use crate::error::DecodeError;
use crate::grant::LicenseGrant;
use crate::verifier::{self, LicensePublicKey, ED25519_TAG};

/// Structural marker that opens every artifact.
pub const ARTIFACT_MAGIC: &str = "hlic";

/// Artifact format version written by this build.
pub const FORMAT_VERSION: &str = "v1";

/// Header fields of a decoded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub format_version: String,
    pub algorithm: String,
}

/// A structurally valid artifact whose signature has not been checked yet.
///
/// The grant inside is only released by [`DecodedArtifact::into_verified`].
#[derive(Debug, Clone)]
pub struct DecodedArtifact {
    metadata: ArtifactMetadata,
    signed_message: Vec<u8>,
    payload: Vec<u8>,
    signature: Vec<u8>,
    grant: LicenseGrant,
}

impl DecodedArtifact {
    #[must_use]
    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// The decoded payload JSON.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The bytes the signature covers (`hlic.v1.<alg>.<payload_b64>`).
    #[must_use]
    pub fn signed_message(&self) -> &[u8] {
        &self.signed_message
    }

    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Checks the signature and, only if it holds, releases the grant.
    #[must_use]
    pub fn into_verified(self, public_key: &LicensePublicKey) -> Option<LicenseGrant> {
        verifier::verify(
            &self.metadata.algorithm,
            &self.signed_message,
            &self.signature,
            public_key,
        )
        .then_some(self.grant)
    }
}

/// Splits and decodes an artifact without trusting any of its fields.
pub fn decode(bytes: &[u8]) -> Result<DecodedArtifact, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DecodeError::InvalidStructure("artifact is not UTF-8 text".to_string()))?
        .trim();

    let (signed, signature_b64) = text
        .rsplit_once('.')
        .ok_or_else(|| DecodeError::InvalidStructure("missing signature section".to_string()))?;

    let parts: Vec<&str> = signed.split('.').collect();
    let [magic, version, algorithm, payload_b64] = parts.as_slice() else {
        return Err(DecodeError::InvalidStructure(format!(
            "expected 5 dot-separated sections, found {}",
            parts.len() + 1
        )));
    };

    if *magic != ARTIFACT_MAGIC {
        return Err(DecodeError::InvalidStructure(
            "missing license artifact marker".to_string(),
        ));
    }
    if *version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedFormat((*version).to_string()));
    }
    if algorithm.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
        return Err(DecodeError::InvalidStructure("empty section".to_string()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| DecodeError::InvalidEncoding(format!("payload: {e}")))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| DecodeError::InvalidEncoding(format!("signature: {e}")))?;

    let grant = LicenseGrant::from_payload(&payload)?;

    Ok(DecodedArtifact {
        metadata: ArtifactMetadata {
            format_version: (*version).to_string(),
            algorithm: (*algorithm).to_string(),
        },
        signed_message: signed.as_bytes().to_vec(),
        payload,
        signature,
        grant,
    })
}

/// Signs `grant` and renders it as an artifact string.
pub fn encode(grant: &LicenseGrant, signing_key: &SigningKey) -> Result<String, DecodeError> {
    let payload = grant.to_payload()?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let signed = format!("{ARTIFACT_MAGIC}.{FORMAT_VERSION}.{ED25519_TAG}.{payload_b64}");
    let signature = signing_key.sign(signed.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    Ok(format!("{signed}.{sig_b64}"))
}
