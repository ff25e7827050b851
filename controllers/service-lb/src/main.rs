//! Service Load-Balancer Controller
//!
//! Watches Services of type LoadBalancer and converges a cloud load balancer,
//! its listeners and VServer groups to what each Service declares:
//! - one listener per Service port, configured from annotations
//! - one VServer group per port, filled with nodes or pods
//! - the load balancer address published in the Service status

mod annotation;
mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod metrics;
mod model;
mod reconciler;
mod sync_tracker;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Service Load-Balancer Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Cluster: {}", config.cluster_id);
    info!("  Region: {}", config.region_id);
    info!("  Cloud endpoint: {}", config.cloud_endpoint);
    info!("  VPC: {}", config.vpc_id.as_deref().unwrap_or("(not set)"));
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Metrics: {}", config.metrics_addr);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Resync: {:?}", config.resync_interval);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
