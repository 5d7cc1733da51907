//! Request middleware: license enforcement and request logging.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use horary_license::{Denial, FeatureGate};
use serde_json::json;
use tracing::{info, warn};

use crate::metrics::ApiMetrics;
use crate::run_blocking;

/// What a protected route needs from the license.
#[derive(Clone)]
pub struct LicenseRequirement {
    gate: Arc<FeatureGate>,
    metrics: Arc<ApiMetrics>,
    feature: &'static str,
}

impl LicenseRequirement {
    /// A valid license that includes `feature`.
    #[must_use]
    pub fn feature(gate: Arc<FeatureGate>, metrics: Arc<ApiMetrics>, feature: &'static str) -> Self {
        Self {
            gate,
            metrics,
            feature,
        }
    }
}

/// Runs the wrapped handler only if the gate authorizes the requirement.
///
/// The granted [`horary_license::Access`] is attached to the request
/// extensions so handlers can tell a degraded grant from a full one.
pub async fn require_license(
    State(requirement): State<LicenseRequirement>,
    mut request: Request,
    next: Next,
) -> Response {
    let gate = Arc::clone(&requirement.gate);
    let feature = requirement.feature;
    let decision = match run_blocking(move || gate.authorize(Some(feature))).await {
        Ok(decision) => decision,
        Err(response) => return response,
    };

    match decision {
        Ok(access) => {
            if access.is_degraded() {
                requirement.metrics.record_feature_denial(feature);
            }
            request.extensions_mut().insert(access);
            next.run(request).await
        }
        Err(denial) => {
            record_denial(&requirement.metrics, &denial);
            warn!(
                path = %request.uri().path(),
                code = denial.code(),
                "Request denied by license gate"
            );
            DenialResponse(denial).into_response()
        }
    }
}

/// Bumps the counter that matches `denial`.
pub fn record_denial(metrics: &ApiMetrics, denial: &Denial) {
    match (&denial.feature, denial.requires_license()) {
        (Some(feature), false) => metrics.record_feature_denial(feature),
        _ => metrics.record_license_denial(),
    }
}

/// A license denial rendered as `403 Forbidden`.
#[derive(Debug)]
pub struct DenialResponse(pub Denial);

impl IntoResponse for DenialResponse {
    fn into_response(self) -> Response {
        let denial = self.0;
        let body = if denial.requires_license() {
            json!({
                "success": false,
                "error": denial.message(),
                "code": denial.code(),
                "requires_license": true,
            })
        } else {
            json!({
                "success": false,
                "error": denial.message(),
                "code": denial.code(),
                "requires_feature": denial.feature,
                "available_features": denial.available_features,
                "requires_upgrade": true,
            })
        };
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

/// Logs method, path and status of every request and records it in `metrics`.
///
/// Requests are keyed by their route template; unrouted ones share a bucket.
pub async fn log_request(
    State(metrics): State<Arc<ApiMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |matched| matched.as_str().to_string());
    info!("{method} {path}");

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let status = response.status();
    metrics.record_response(&endpoint, status.is_client_error() || status.is_server_error(), elapsed);
    info!(
        "Response: {} - {method} {path} in {:.3}s",
        status.as_u16(),
        elapsed.as_secs_f64()
    );
    response
}
