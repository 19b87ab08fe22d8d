//! MIG Partitioner - GPU partitioning planner service
//!
//! Serves partitioning plans computed from cluster snapshots, together with
//! health checks and Prometheus metrics.

use anyhow::{Context, Result};
use mig_partitioner::{api, config::PartitionerConfig};
use partitioner_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    Planner, PlannerConfig, ResourceFitOracle, SliceCatalog,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PARTITIONER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting mig-partitioner");

    let config = PartitionerConfig::load()?;
    info!(
        instance = %config.instance_name,
        api_port = config.api_port,
        plan_timeout_secs = config.plan_timeout_secs,
        "Partitioner configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::PLANNER).await;

    let catalog = match &config.known_geometries_file {
        Some(path) => SliceCatalog::load(path)
            .with_context(|| format!("Failed to load known geometries from {}", path.display()))?,
        None => SliceCatalog::builtin(),
    };
    let catalog_models = catalog.models().count();

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(PARTITIONER_VERSION, catalog_models);

    let mut planner_config = PlannerConfig::default();
    if let Some(max_concurrency) = config.max_concurrency {
        planner_config.max_concurrency = max_concurrency;
    }
    let planner = Planner::new(Arc::new(ResourceFitOracle::new()), Arc::new(catalog))
        .with_config(planner_config)
        .with_logger(logger.clone());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        planner,
        Duration::from_secs(config.plan_timeout_secs),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API server task panicked");
                    return Err(e.into());
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
