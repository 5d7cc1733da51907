//! Where license artifact bytes come from.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Why artifact bytes could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Nothing exists at the configured location.
    Missing,
    /// The location exists but could not be read in time.
    Unreadable(String),
}

/// A read-only supplier of artifact bytes.
pub trait ArtifactSource: Send + Sync {
    /// Reads the whole artifact.
    fn read(&self) -> Result<Vec<u8>, SourceError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Reads the artifact from a file, giving up after a bounded time.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    timeout: Duration,
}

impl FileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSource for FileSource {
    fn read(&self) -> Result<Vec<u8>, SourceError> {
        let (tx, rx) = mpsc::channel();
        let path = self.path.clone();

        // The helper thread is abandoned on timeout.
        thread::Builder::new()
            .name("license-read".to_string())
            .spawn(move || {
                let _ = tx.send(std::fs::read(&path));
            })
            .map_err(|e| SourceError::Unreadable(format!("cannot spawn reader: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => Err(SourceError::Missing),
            Ok(Err(e)) => Err(SourceError::Unreadable(e.to_string())),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SourceError::Unreadable(format!(
                "read timed out after {:?}",
                self.timeout
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(SourceError::Unreadable("reader thread exited".to_string()))
            }
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Artifact bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bytes: Option<Vec<u8>>,
}

impl MemorySource {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Some(bytes.into()),
        }
    }

    /// A source that always reports a missing artifact.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl ArtifactSource for MemorySource {
    fn read(&self) -> Result<Vec<u8>, SourceError> {
        self.bytes.clone().ok_or(SourceError::Missing)
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
