//! HTTP surface of the Horary API.
//!
//! Builds the axum router around a shared [`LicenseManager`]. Protected
//! routes sit behind [`middleware::require_license`]; everything under
//! `/api/license`, `/api/health`, `/api/version` and `/api/metrics` keeps
//! working without a license.

pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use horary_license::{FeatureGate, LicenseManager};
use serde_json::json;
use tracing::error;

use crate::metrics::ApiMetrics;
use crate::middleware::LicenseRequirement;
use crate::services::Services;

/// Reported API version.
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub license: Arc<LicenseManager>,
    pub gate: Arc<FeatureGate>,
    pub services: Services,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    /// State sharing `gate`'s manager, with fresh counters.
    #[must_use]
    pub fn new(gate: FeatureGate, services: Services) -> Self {
        Self {
            license: Arc::clone(gate.manager()),
            gate: Arc::new(gate),
            services,
            metrics: Arc::new(ApiMetrics::default()),
        }
    }
}

/// Build the HTTP API router.
pub fn build_router(state: AppState) -> Router {
    let engine_guard = LicenseRequirement::feature(
        Arc::clone(&state.gate),
        Arc::clone(&state.metrics),
        "enhanced_engine",
    );
    let timezone_guard = LicenseRequirement::feature(
        Arc::clone(&state.gate),
        Arc::clone(&state.metrics),
        "timezone_support",
    );
    let moon_guard = LicenseRequirement::feature(
        Arc::clone(&state.gate),
        Arc::clone(&state.metrics),
        "moon_analysis",
    );

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/version", get(routes::version))
        .route("/api/metrics", get(routes::metrics))
        .route("/api/license/status", get(routes::license_status))
        .route("/api/license/features", get(routes::license_features))
        .route("/api/license/validate", post(routes::validate_license_file))
        .route(
            "/api/calculate-chart",
            post(routes::calculate_chart)
                .route_layer(from_fn_with_state(engine_guard, middleware::require_license)),
        )
        .route(
            "/api/get-timezone",
            post(routes::get_timezone).route_layer(from_fn_with_state(
                timezone_guard.clone(),
                middleware::require_license,
            )),
        )
        .route(
            "/api/current-time",
            post(routes::current_time)
                .route_layer(from_fn_with_state(timezone_guard, middleware::require_license)),
        )
        .route(
            "/api/moon-debug",
            post(routes::moon_debug)
                .route_layer(from_fn_with_state(moon_guard, middleware::require_license)),
        )
        .layer(from_fn_with_state(
            Arc::clone(&state.metrics),
            middleware::log_request,
        ))
        .with_state(state)
}

/// Runs blocking license or collaborator work off the async runtime.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Blocking task failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": "Internal server error" })),
        )
            .into_response()
    })
}
