//! PSC Port Mapper Controller
//!
//! Exposes every replica of an annotated StatefulSet through a GCP Private
//! Service Connect service attachment. Each replica gets its own consumer
//! port: a NodePort service, a firewall rule, a `GCE_VM_IP_PORTMAP` network
//! endpoint group, a backend service, a forwarding rule and a service
//! attachment are kept in sync with the StatefulSet's pods.
//!
//! Annotate a StatefulSet with `0x5d.org/psc-portmapper` to opt in.

mod config;
mod controller;
mod error;
mod metrics;
mod portmap;
mod reconcile_helpers;
mod reconciler;
mod spec;
#[cfg(test)]
mod test_utils;
mod trigger;
mod watcher;
mod workload;

use anyhow::{anyhow, Context, Result};
use config::Config;
use controller::Controller;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install the rustls ring crypto provider"))?;

    info!("Starting PSC Port Mapper Controller");

    let config = Config::from_env().context("loading configuration")?;
    info!("Configuration:");
    info!("  Project: {}", config.gcp.project);
    info!("  Region: {}", config.gcp.region);
    info!("  Network: {}", config.gcp.network);
    info!("  Subnet: {}", config.gcp.subnet);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));

    let controller = Controller::new(config)
        .await
        .context("initializing controller")?;
    controller.run().await?;

    Ok(())
}
