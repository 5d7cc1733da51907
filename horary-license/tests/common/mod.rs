//! Shared test helpers for license tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use horary_license::{
    encode, ArtifactSource, LicenseConfig, LicenseGrant, LicenseManager, LicensePublicKey,
    LicenseType, SourceError,
};

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, LicensePublicKey) {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let public_key = LicensePublicKey::from(signing_key.verifying_key());
    (signing_key, public_key)
}

/// A grant valid over `[issued_at, expires_at]` with the given features.
pub fn grant_between(
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    features: &[&str],
) -> LicenseGrant {
    LicenseGrant::new(
        "Test Observatory",
        LicenseType::Professional,
        issued_at,
        expires_at,
        features.iter().copied(),
    )
}

/// A grant issued a day ago that expires `valid_for` from now.
pub fn grant_expiring_in(valid_for: chrono::Duration, features: &[&str]) -> LicenseGrant {
    let now = Utc::now();
    grant_between(now - chrono::Duration::days(1), now + valid_for, features)
}

/// Signs `grant` into an artifact string.
pub fn sign(signing_key: &SigningKey, grant: &LicenseGrant) -> String {
    encode(grant, signing_key).unwrap()
}

/// A standard 90-day artifact with `features`, signed by the test key.
pub fn valid_artifact(features: &[&str]) -> (LicenseGrant, String) {
    let (sk, _) = test_keypair();
    let grant = grant_expiring_in(chrono::Duration::days(90), features);
    let artifact = sign(&sk, &grant);
    (grant, artifact)
}

/// Artifact source that counts reads and can be swapped at runtime.
#[derive(Clone, Default)]
pub struct CountingSource {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    reads: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingSource {
    pub fn new(artifact: &str) -> Self {
        let source = Self::default();
        source.set(artifact);
        source
    }

    pub fn missing() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` on every read, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, artifact: &str) {
        *self.bytes.lock().unwrap() = Some(artifact.as_bytes().to_vec());
    }

    pub fn remove(&self) {
        *self.bytes.lock().unwrap() = None;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn read(&self) -> Result<Vec<u8>, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.bytes.lock().unwrap().clone().ok_or(SourceError::Missing)
    }

    fn describe(&self) -> String {
        "<counting>".to_string()
    }
}

/// A manager over `source`, trusting the test key, with `ttl`.
pub fn manager_over(source: &CountingSource, ttl: Duration) -> LicenseManager {
    let (_, pk) = test_keypair();
    let config = LicenseConfig {
        cache_ttl_secs: ttl.as_secs(),
        ..LicenseConfig::for_path("unused.hlic")
    };
    LicenseManager::with_source(Box::new(source.clone()), pk, &config)
}
