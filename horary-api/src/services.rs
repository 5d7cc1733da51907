//! Collaborators the API delegates to.
//!
//! The calculation engine, geocoder and timezone lookup live outside this
//! workspace; the service only sees these traits.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings passed to the engine along with the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSettings {
    pub location: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub use_current_time: bool,
    pub manual_houses: Option<Vec<u32>>,
    pub ignore_radicality: bool,
    pub ignore_void_moon: bool,
    pub ignore_combustion: bool,
    pub ignore_saturn_7th: bool,
    pub exaltation_confidence_boost: f64,
    pub future_retrograde_check: bool,
}

/// Failures reported by the calculation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The chart location could not be resolved.
    #[error("location error: {0}")]
    Location(String),

    #[error("calculation failed: {0}")]
    Failed(String),
}

/// The horary calculation engine.
pub trait HoraryEngine: Send + Sync {
    /// Judges `question` and returns the engine's result document.
    ///
    /// The document may carry an `error` field for soft failures.
    fn judge(&self, question: &str, settings: &JudgeSettings) -> Result<serde_json::Value, EngineError>;
}

/// A resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub canonical_name: String,
}

#[derive(Debug, Error)]
#[error("location not found: {0}")]
pub struct LocationNotFound(pub String);

/// Resolves place names to coordinates.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, location: &str) -> Result<GeoLocation, LocationNotFound>;
}

/// Resolves coordinates to an IANA timezone id.
pub trait TimezoneResolver: Send + Sync {
    fn timezone_for(&self, latitude: f64, longitude: f64) -> Option<String>;

    /// Offset of `timezone` from UTC at the instant `at`.
    ///
    /// `None` when the resolver has no rules for the zone; callers then
    /// report UTC.
    fn utc_offset(&self, _timezone: &str, _at: DateTime<Utc>) -> Option<FixedOffset> {
        None
    }
}

/// The collaborators wired into this process. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Services {
    pub engine: Option<Arc<dyn HoraryEngine>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub timezones: Option<Arc<dyn TimezoneResolver>>,
}

impl Services {
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn HoraryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    #[must_use]
    pub fn with_timezones(mut self, timezones: Arc<dyn TimezoneResolver>) -> Self {
        self.timezones = Some(timezones);
        self
    }
}
