//! Main controller implementation.
//!
//! Builds the clients, the reconciler and the metrics registry, then runs the
//! StatefulSet watcher next to the probe/metrics server until either stops.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::{self, HttpState, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher;
use crate::workload::KubeWorkloadClient;
use gcp_client::{GcpClient, TokenSource};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Port mapper controller
pub struct Controller {
    stateful_set_watcher: JoinHandle<Result<(), ControllerError>>,
    http_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing PSC port mapper controller");

        let kube_client = Client::try_default().await?;

        let gcp_client = match &config.access_token {
            Some(token) => GcpClient::new(config.gcp.clone(), TokenSource::fixed(token.clone()))?,
            None => {
                info!("No GCP_ACCESS_TOKEN set, using the metadata server for credentials");
                GcpClient::with_metadata_auth(config.gcp.clone())?
            }
        };

        let metrics = Arc::new(
            Metrics::new()
                .map_err(|e| ControllerError::InvalidConfig(format!("metrics registry: {}", e)))?,
        );
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(gcp_client),
            Arc::new(KubeWorkloadClient::new(kube_client.clone())),
            config.reconciler_settings(),
            metrics.clone(),
        ));

        let (stateful_set_api, pod_api): (Api<StatefulSet>, Api<Pod>) = match &config.namespace {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client)),
        };

        let stateful_set_watcher = tokio::spawn(async move {
            watcher::watch_stateful_sets(stateful_set_api, pod_api, reconciler).await
        });

        let ready = Arc::new(AtomicBool::new(false));
        let state = HttpState {
            metrics,
            ready: ready.clone(),
        };
        let health_addr = config.health_addr;
        let http_server = tokio::spawn(async move { metrics::serve(health_addr, state).await });

        ready.store(true, Ordering::SeqCst);
        info!("Controller initialized");

        Ok(Self {
            stateful_set_watcher,
            http_server,
        })
    }

    /// Runs until the watcher or the HTTP server stops.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Controller running");

        tokio::select! {
            result = &mut self.stateful_set_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("StatefulSet watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("StatefulSet watcher error: {}", e)))?;
            }
            result = &mut self.http_server => {
                result.map_err(|e| ControllerError::Watch(format!("HTTP server panicked: {}", e)))??;
            }
        }

        error!("Controller stopped unexpectedly");
        Err(ControllerError::Watch("controller task exited".to_string()))
    }
}
