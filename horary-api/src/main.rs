//! Horary API server
//!
//! Serves the horary HTTP API with offline license enforcement. The license
//! artifact is validated once at startup and then on demand, with results
//! cached for the configured TTL.
//!
//! Usage:
//!   horary-api --port 5000 --license /etc/horary/license.hlic

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use horary_license::{FeatureGate, LicenseConfig, LicenseManager, ValidationResult};
use horary_api::{build_router, services::Services, AppState, API_VERSION};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "horary-api")]
#[command(about = "Horary astrology API with offline license validation")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Path to the license config file
    #[arg(short, long, default_value = "license.toml")]
    config: PathBuf,

    /// License artifact path (overrides config and environment)
    #[arg(short, long)]
    license: Option<PathBuf>,

    /// License cache TTL in seconds (overrides config)
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Horary API v{API_VERSION} starting...");

    let mut config = LicenseConfig::load(&args.config)
        .with_context(|| format!("Failed to load license config {}", args.config.display()))?
        .with_env_overrides();
    if let Some(path) = args.license {
        config.license_path = path;
    }
    if let Some(ttl) = args.cache_ttl {
        config.cache_ttl_secs = ttl;
    }

    let manager = Arc::new(LicenseManager::new(&config));
    info!("License source: {}", manager.source_description());
    check_license_on_startup(&manager);

    // Collaborators are wired by deployments that embed this crate.
    let state = AppState::new(FeatureGate::new(manager, config.policy.clone()), Services::default());
    let app = build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP API listening on {addr}");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

fn check_license_on_startup(manager: &LicenseManager) {
    match manager.validate_license(false) {
        ValidationResult::Valid {
            grant,
            days_remaining,
        } => {
            info!("License valid for: {}", grant.licensed_to);
            info!("License type: {}", grant.license_type.as_str());
            info!("Days remaining: {days_remaining}");
            let features: Vec<&str> = grant.features.iter().map(String::as_str).collect();
            info!("Licensed features: {}", features.join(", "));
        }
        ValidationResult::Invalid(reason) => {
            warn!("License validation failed: {reason}");
            warn!("Protected endpoints will answer 403 until a valid license is installed");
            if std::env::var("HORARY_ENV").is_ok_and(|env| env == "production") {
                error!("Running in production without a valid license");
            }
        }
    }
}
