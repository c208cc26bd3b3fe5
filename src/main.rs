use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use api_shared::ApiKey;
use biobank_core::CoreConfig;
use biobank_core::config::{box_capacity_from_env_value, flag_from_env_value};
use biobank_core::constants::DEFAULT_DATA_DIR;

/// Main entry point for the biobank service
///
/// Loads `.env`, then serves the REST API (with Swagger UI at `/swagger-ui`) until Ctrl-C.
///
/// # Environment Variables
/// - `BIOBANK_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `BIOBANK_DATA_DIR`: Directory for project data (default: "biobank_data")
/// - `BIOBANK_DEFAULT_BOX_CAPACITY`: Capacity of new boxes (default: 100)
/// - `BIOBANK_ALLOW_EMPTY_BOX_SWITCH`: Allow leaving a box with no members (default: false)
/// - `BIOBANK_API_KEY`: API key for project routes; unset leaves them open
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("biobank_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("biobank_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("BIOBANK_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
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

    tracing::info!("++ Starting biobank REST on {}", rest_addr);
    tracing::info!(
        "++ Data in {}, default box capacity {}",
        cfg.data_dir().display(),
        cfg.default_box_capacity()
    );

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(AppState::new(cfg, api_key)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("-- Shutting down");
        })
        .await?;

    Ok(())
}
