//! REST API server without `.env` loading.
//!
//! Runs the biobank REST API with OpenAPI/Swagger UI. The workspace's main `biobank-run` binary
//! runs the same router with `.env` support.

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use api_shared::ApiKey;
use biobank_core::config::{box_capacity_from_env_value, flag_from_env_value};
use biobank_core::constants::DEFAULT_DATA_DIR;
use biobank_core::CoreConfig;

/// Main entry point for the biobank REST API server
///
/// # Environment Variables
/// - `BIOBANK_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `BIOBANK_DATA_DIR`: Project data directory (default: "biobank_data")
/// - `BIOBANK_DEFAULT_BOX_CAPACITY`: Default box capacity (default: 100)
/// - `BIOBANK_ALLOW_EMPTY_BOX_SWITCH`: Allow leaving an empty box (default: false)
/// - `BIOBANK_API_KEY`: Required `x-api-key` value; unset disables the check
///
/// # Errors
/// Fails on an invalid filter directive or configuration value, an address that cannot be bound,
/// or a server error while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("biobank_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("BIOBANK_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = std::env::var("BIOBANK_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let capacity = box_capacity_from_env_value(std::env::var("BIOBANK_DEFAULT_BOX_CAPACITY").ok())?;
    let allow_switch = flag_from_env_value(std::env::var("BIOBANK_ALLOW_EMPTY_BOX_SWITCH").ok())?;
    let cfg = Arc::new(
        CoreConfig::new(PathBuf::from(data_dir), capacity)?.with_switch_from_empty_box(allow_switch),
    );
    std::fs::create_dir_all(cfg.projects_dir())?;

    let api_key = ApiKey::new(std::env::var("BIOBANK_API_KEY").ok());
    if !api_key.is_enabled() {
        tracing::warn!("BIOBANK_API_KEY not set; project routes are unauthenticated");
    }

    tracing::info!("-- Starting biobank REST API on {}", addr);
    let app = router(AppState::new(cfg, api_key));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
