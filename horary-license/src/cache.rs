//! Memoized validation result with a time-to-live.

use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::result::ValidationResult;

/// One computed validation result and when it was computed.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: ValidationResult,
    /// Wall-clock time of the computation, for reporting.
    pub checked_at: DateTime<Utc>,
    /// Monotonic time of the computation, for TTL checks.
    pub computed: Instant,
    /// Whether the entry came from a forced reload.
    pub forced: bool,
}

impl CacheEntry {
    #[must_use]
    pub fn new(result: ValidationResult, forced: bool) -> Self {
        Self {
            result,
            checked_at: Utc::now(),
            computed: Instant::now(),
            forced,
        }
    }

    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.computed.elapsed() < ttl
    }
}

/// Single-slot cache guarded for many readers and one writer.
///
/// Entries are swapped whole under the write lock, so a reader sees either
/// the previous entry or the new one. The refresh lock serializes the
/// computations that produce new entries.
#[derive(Debug)]
pub struct LicenseCache {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
    refresh: Mutex<()>,
}

impl LicenseCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current entry, fresh or not.
    #[must_use]
    pub fn current(&self) -> Option<CacheEntry> {
        self.entry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The current entry if it is younger than the TTL.
    #[must_use]
    pub fn fresh(&self) -> Option<CacheEntry> {
        self.current().filter(|entry| entry.is_fresh(self.ttl))
    }

    /// Replaces the entry.
    pub fn store(&self, entry: CacheEntry) {
        *self
            .entry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(entry);
    }

    /// Drops the entry so the next lookup misses.
    pub fn invalidate(&self) {
        *self
            .entry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Takes the refresh lock. Hold it while computing a new entry.
    pub fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
