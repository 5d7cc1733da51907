//! Route handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use horary_license::{Access, LicenseConfig, LicenseManager, LicenseStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::middleware::{record_denial, DenialResponse};
use crate::services::{EngineError, GeoLocation, JudgeSettings};
use crate::{run_blocking, AppState, API_VERSION};

const ENGINE_VERSION: &str = "Enhanced Traditional Horary 2.0 (Licensed)";

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

fn chart_error(status: StatusCode, message: impl Into<String>, judgment: &str, reasoning: &str) -> Response {
    (
        status,
        Json(json!({
            "error": message.into(),
            "judgment": judgment,
            "confidence": 0,
            "reasoning": [reasoning],
        })),
    )
        .into_response()
}

/// Status of the shared manager, validating first if nothing is cached.
async fn current_status(state: &AppState) -> Result<LicenseStatus, Response> {
    let license = Arc::clone(&state.license);
    run_blocking(move || license.get_license_status()).await
}

// ---------------------------------------------------------------------------
// License endpoints
// ---------------------------------------------------------------------------

/// `GET /api/license/status`: forces a re-read, then reports.
pub async fn license_status(State(state): State<AppState>) -> Response {
    state.metrics.record_license_check();
    let license = Arc::clone(&state.license);
    let status = run_blocking(move || {
        license.validate_license(true);
        license.get_license_status()
    })
    .await;

    match status {
        Ok(status) => Json(json!({
            "license": status,
            "api_version": API_VERSION,
            "last_checked": status.last_checked,
            "success": true,
        }))
        .into_response(),
        Err(response) => response,
    }
}

/// `GET /api/license/features`
pub async fn license_features(State(state): State<AppState>) -> Response {
    match current_status(&state).await {
        Ok(status) => Json(json!({
            "available_features": status.features,
            "feature_count": status.feature_count,
            "license_valid": status.valid,
            "license_type": status.license_type.as_deref().unwrap_or("unknown"),
            "success": true,
        }))
        .into_response(),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub license_path: Option<String>,
}

/// `POST /api/license/validate`: checks an artifact at another path.
///
/// Uses a throwaway manager trusting the same key; the shared manager's
/// cache is untouched.
pub async fn validate_license_file(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Response {
    let path = match payload {
        Ok(Json(ValidateRequest {
            license_path: Some(path),
        })) if !path.trim().is_empty() => path,
        _ => return json_error(StatusCode::BAD_REQUEST, "License file path required"),
    };

    info!("Validating license file at {path}");
    let public_key = state.license.public_key();
    let status = run_blocking(move || {
        let manager = LicenseManager::with_public_key(&LicenseConfig::for_path(path), public_key);
        manager.validate_license(false);
        manager.get_license_status()
    })
    .await;

    match status {
        Ok(status) => Json(json!({
            "valid": status.valid,
            "license_info": status,
            "success": true,
        }))
        .into_response(),
        Err(response) => response,
    }
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Response {
    let status = match current_status(&state).await {
        Ok(status) => status,
        Err(response) => return response,
    };

    let collaborator = |wired: bool| if wired { "healthy" } else { "unavailable" };
    let services = json!({
        "license_system": {
            "status": if status.valid { "healthy" } else { "degraded" },
            "license_valid": status.valid,
            "source": state.license.source_description(),
        },
        "engine": { "status": collaborator(state.services.engine.is_some()) },
        "geocoder": { "status": collaborator(state.services.geocoder.is_some()) },
        "timezones": { "status": collaborator(state.services.timezones.is_some()) },
    });

    Json(json!({
        "status": if status.valid { "healthy" } else { "degraded" },
        "timestamp": Utc::now(),
        "version": API_VERSION,
        "services": services,
        "metrics": state.metrics.snapshot(),
        "license": {
            "valid": status.valid,
            "last_checked": status.last_checked,
            "days_remaining": status.days_remaining,
        },
    }))
    .into_response()
}

/// `GET /api/version`
pub async fn version(State(state): State<AppState>) -> Response {
    let status = match current_status(&state).await {
        Ok(status) => status,
        Err(response) => return response,
    };

    Json(json!({
        "api_version": API_VERSION,
        "engine_version": ENGINE_VERSION,
        "license_system": {
            "enabled": true,
            "valid": status.valid,
            "licensed_to": status.licensed_to.as_deref().unwrap_or("Unlicensed"),
            "license_type": status.license_type.as_deref().unwrap_or("unknown"),
            "days_remaining": status.days_remaining,
            "features_available": status.feature_count,
        },
        "licensed_features": status.features,
        "timestamp": Utc::now(),
    }))
    .into_response()
}

/// `GET /api/metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    let status = match current_status(&state).await {
        Ok(status) => status,
        Err(response) => return response,
    };

    Json(json!({
        "status": "success",
        "metrics": state.metrics.snapshot(),
        "license": {
            "valid": status.valid,
            "features_enabled": status.feature_count,
            "license_features": status.entitled_features(),
        },
        "timestamp": Utc::now(),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Chart calculation
// ---------------------------------------------------------------------------

/// Body of `POST /api/calculate-chart`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartRequest {
    pub question: String,
    pub location: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub use_current_time: bool,
    /// Comma separated house numbers, querent first (e.g. `"1,7"`).
    pub manual_houses: Option<String>,
    pub ignore_radicality: bool,
    pub ignore_void_moon: bool,
    pub ignore_combustion: bool,
    pub ignore_saturn_7th: bool,
    pub exaltation_confidence_boost: f64,
    pub future_retrograde_check: bool,
}

impl Default for ChartRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            location: "London, UK".to_string(),
            date: None,
            time: None,
            timezone: None,
            use_current_time: true,
            manual_houses: None,
            ignore_radicality: false,
            ignore_void_moon: false,
            ignore_combustion: false,
            ignore_saturn_7th: false,
            exaltation_confidence_boost: 15.0,
            future_retrograde_check: true,
        }
    }
}

impl ChartRequest {
    fn uses_overrides(&self) -> bool {
        self.ignore_radicality || self.ignore_void_moon || self.ignore_combustion || self.ignore_saturn_7th
    }

    fn clear_overrides(&mut self) {
        self.ignore_radicality = false;
        self.ignore_void_moon = false;
        self.ignore_combustion = false;
        self.ignore_saturn_7th = false;
    }
}

/// Parses `"1,7"` style house lists. At least two houses are required.
fn parse_manual_houses(spec: &str) -> Result<Vec<u32>, &'static str> {
    let houses = spec
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "Manual houses must be numbers separated by commas (e.g., \"1,7\")")?;
    if houses.len() < 2 {
        return Err("Manual houses must include at least querent and quesited houses (e.g., \"1,7\")");
    }
    Ok(houses)
}

/// Optional feature inside an already licensed request.
///
/// `Ok(true)` means entitled, `Ok(false)` means run without it.
async fn optional_feature(state: &AppState, feature: &'static str) -> Result<bool, Response> {
    let gate = Arc::clone(&state.gate);
    match run_blocking(move || gate.authorize(Some(feature))).await? {
        Ok(Access::Granted) => Ok(true),
        Ok(Access::Degraded { .. }) => {
            state.metrics.record_feature_denial(feature);
            Ok(false)
        }
        Err(denial) => {
            record_denial(&state.metrics, &denial);
            Err(DenialResponse(denial).into_response())
        }
    }
}

/// `POST /api/calculate-chart`, behind `enhanced_engine`.
pub async fn calculate_chart(
    State(state): State<AppState>,
    payload: Result<Json<ChartRequest>, JsonRejection>,
) -> Response {
    let mut request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            warn!("Rejected chart request body: {e}");
            return chart_error(StatusCode::BAD_REQUEST, "No JSON data provided", "ERROR", "No JSON data provided");
        }
    };

    let mut features_used = vec!["enhanced_engine"];
    if request.uses_overrides() {
        match optional_feature(&state, "override_flags").await {
            Ok(true) => features_used.push("override_flags"),
            Ok(false) => {
                warn!("Override flags not licensed, ignoring them");
                request.clear_overrides();
            }
            Err(response) => return response,
        }
    }
    if request.future_retrograde_check {
        match optional_feature(&state, "future_retrograde").await {
            Ok(true) => features_used.push("future_retrograde"),
            Ok(false) => {
                warn!("Future retrograde check not licensed, skipping it");
                request.future_retrograde_check = false;
            }
            Err(response) => return response,
        }
    }

    let question = request.question.trim().to_string();
    let location = request.location.trim().to_string();
    if question.is_empty() {
        return chart_error(StatusCode::BAD_REQUEST, "Question is required", "ERROR", "No horary question provided");
    }
    if location.is_empty() {
        return chart_error(StatusCode::BAD_REQUEST, "Location is required", "ERROR", "No location provided");
    }

    let manual_houses = match request.manual_houses.as_deref().map(str::trim) {
        Some(spec) if !spec.is_empty() => match parse_manual_houses(spec) {
            Ok(houses) => Some(houses),
            Err(message) => {
                return chart_error(StatusCode::BAD_REQUEST, message, "ERROR", "Invalid manual house specification");
            }
        },
        _ => None,
    };

    let Some(engine) = state.services.engine.clone() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "Calculation engine not available");
    };

    info!(features = ?features_used, "Chart calculation request: {question}");

    let settings = JudgeSettings {
        location,
        date: request.date.clone(),
        time: request.time.clone(),
        timezone: request.timezone.clone(),
        use_current_time: request.use_current_time,
        manual_houses,
        ignore_radicality: request.ignore_radicality,
        ignore_void_moon: request.ignore_void_moon,
        ignore_combustion: request.ignore_combustion,
        ignore_saturn_7th: request.ignore_saturn_7th,
        exaltation_confidence_boost: request.exaltation_confidence_boost,
        future_retrograde_check: request.future_retrograde_check,
    };

    let started = Instant::now();
    let judged = {
        let settings = settings.clone();
        run_blocking(move || engine.judge(&question, &settings)).await
    };
    let mut result = match judged {
        Ok(Ok(result)) => result,
        Ok(Err(EngineError::Location(message))) => {
            warn!("Location error: {message}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": message,
                    "judgment": "LOCATION_ERROR",
                    "confidence": 0,
                    "reasoning": [format!("Location error: {message}")],
                    "error_type": "LocationError",
                })),
            )
                .into_response();
        }
        Ok(Err(EngineError::Failed(message))) => {
            error!("Chart calculation failed: {message}");
            return chart_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error calculating chart: {message}"),
                "ERROR",
                &format!("Calculation error: {message}"),
            );
        }
        Err(response) => return response,
    };
    let elapsed = started.elapsed().as_secs_f64();

    if result.get("error").is_some_and(|e| !e.is_null()) {
        error!("Chart calculation returned an error after {elapsed:.2}s");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(result)).into_response();
    }

    let status = match current_status(&state).await {
        Ok(status) => status,
        Err(response) => return response,
    };
    let Some(document) = result.as_object_mut() else {
        error!("Engine returned a non-object result");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Engine returned an unexpected result");
    };
    document.insert(
        "license_metadata".to_string(),
        json!({
            "licensed_to": status.licensed_to.as_deref().unwrap_or("Unknown"),
            "license_type": status.license_type.as_deref().unwrap_or("unknown"),
            "features_used": features_used,
            "calculation_licensed": true,
        }),
    );
    document.insert(
        "calculation_metadata".to_string(),
        json!({
            "calculation_time_seconds": elapsed,
            "timestamp": Utc::now(),
            "api_version": API_VERSION,
            "engine_version": ENGINE_VERSION,
            "license_verified": true,
            "override_flags_applied": {
                "ignore_radicality": settings.ignore_radicality,
                "ignore_void_moon": settings.ignore_void_moon,
                "ignore_combustion": settings.ignore_combustion,
                "ignore_saturn_7th": settings.ignore_saturn_7th,
            },
            "enhanced_parameters": {
                "exaltation_confidence_boost": settings.exaltation_confidence_boost,
                "future_retrograde_check": settings.future_retrograde_check,
            },
        }),
    );

    info!(
        judgment = %result.get("judgment").unwrap_or(&serde_json::Value::Null),
        "Chart calculation completed in {elapsed:.2}s"
    );
    Json(result).into_response()
}

// ---------------------------------------------------------------------------
// Timezone lookup
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimezoneRequest {
    pub location: String,
}

/// A geocoded place with its timezone, if one is known.
struct Located {
    found: GeoLocation,
    timezone: Option<String>,
    offset: Option<FixedOffset>,
}

fn location_from(payload: Result<Json<TimezoneRequest>, JsonRejection>) -> Result<String, Response> {
    let location = match payload {
        Ok(Json(request)) => request.location.trim().to_string(),
        Err(_) => return Err(json_error(StatusCode::BAD_REQUEST, "No JSON data provided")),
    };
    if location.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Location is required"));
    }
    Ok(location)
}

/// Geocodes `location` and resolves its timezone and offset at `at`.
async fn locate(state: &AppState, location: String, at: DateTime<Utc>) -> Result<Located, Response> {
    let (Some(geocoder), Some(timezones)) =
        (state.services.geocoder.clone(), state.services.timezones.clone())
    else {
        return Err(json_error(StatusCode::SERVICE_UNAVAILABLE, "Timezone lookup not available"));
    };

    let lookup = run_blocking(move || {
        geocoder.geocode(&location).map(|found| {
            let timezone = timezones.timezone_for(found.latitude, found.longitude);
            let offset = timezone.as_deref().and_then(|tz| timezones.utc_offset(tz, at));
            Located {
                found,
                timezone,
                offset,
            }
        })
    })
    .await?;

    lookup.map_err(|not_found| {
        warn!("Location error: {not_found}");
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": not_found.to_string(),
                "success": false,
                "error_type": "LocationError",
            })),
        )
            .into_response()
    })
}

/// `POST /api/get-timezone`, behind `timezone_support`.
pub async fn get_timezone(
    State(state): State<AppState>,
    payload: Result<Json<TimezoneRequest>, JsonRejection>,
) -> Response {
    let location = match location_from(payload) {
        Ok(location) => location,
        Err(response) => return response,
    };

    info!("Getting timezone for location: {location}");
    match locate(&state, location, Utc::now()).await {
        Ok(Located { found, timezone, .. }) => Json(json!({
            "location": found.canonical_name,
            "latitude": found.latitude,
            "longitude": found.longitude,
            "timezone": timezone,
            "success": true,
            "license_feature": "timezone_support",
        }))
        .into_response(),
        Err(response) => response,
    }
}

/// `POST /api/current-time`, behind `timezone_support`.
///
/// Falls back to UTC when the zone or its offset is unknown.
pub async fn current_time(
    State(state): State<AppState>,
    payload: Result<Json<TimezoneRequest>, JsonRejection>,
) -> Response {
    let location = match location_from(payload) {
        Ok(location) => location,
        Err(response) => return response,
    };

    info!("Getting current time for location: {location}");
    let now = Utc::now();
    let located = match locate(&state, location, now).await {
        Ok(located) => located,
        Err(response) => return response,
    };

    let (timezone, offset) = match (located.timezone, located.offset) {
        (Some(timezone), Some(offset)) => (timezone, offset),
        (timezone, _) => {
            warn!(timezone = ?timezone, "No UTC offset known, reporting UTC");
            ("UTC".to_string(), Utc.fix())
        }
    };
    let local = now.with_timezone(&offset);

    Json(json!({
        "location": located.found.canonical_name,
        "latitude": located.found.latitude,
        "longitude": located.found.longitude,
        "local_time": local.to_rfc3339(),
        "utc_time": now.to_rfc3339(),
        "timezone": timezone,
        "utc_offset": local.format("%z").to_string(),
        "success": true,
        "license_feature": "timezone_support",
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Moon analysis
// ---------------------------------------------------------------------------

/// `POST /api/moon-debug`, behind `moon_analysis`.
///
/// The detailed Moon data ships with chart results; this reports where.
pub async fn moon_debug(payload: Result<Json<Value>, JsonRejection>) -> Response {
    let has_body = match &payload {
        Ok(Json(Value::Object(fields))) => !fields.is_empty(),
        Ok(Json(value)) => !value.is_null(),
        Err(_) => false,
    };
    if !has_body {
        return json_error(StatusCode::BAD_REQUEST, "No JSON data provided");
    }

    Json(json!({
        "message": "Moon void of course details are included in chart calculation results",
        "instructions": "Check the moon_aspects field in the calculate-chart response",
        "enhanced_features": {
            "variable_moon_speed": "Real-time Moon speed from ephemeris",
            "directional_sign_exit": "Motion-aware sign boundary calculations",
            "enhanced_void_detection": "Improved future aspect calculations",
            "solar_conditions": "Check response.solar_factors for detailed analysis",
        },
        "license_feature": "moon_analysis",
        "licensed": true,
        "success": true,
    }))
    .into_response()
}
