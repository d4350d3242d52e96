//! Prometheus metrics and the probe/metrics HTTP server.
//!
//! Serves `/healthz`, `/readyz` and `/metrics` from one axum router. The
//! registry is owned by [`Metrics`] rather than a global so tests can build
//! their own.

use crate::error::{ControllerError, ReconcileStep};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Reconciliation metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    failures: IntCounterVec,
    duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconciliation passes by result")
                .namespace("psc_portmapper"),
            &["result"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("reconcile_failures_total", "Failed reconciliation passes by step")
                .namespace("psc_portmapper"),
            &["step"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new("reconcile_duration_seconds", "Duration of reconciliation passes")
                .namespace("psc_portmapper")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            duration,
        })
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.reconciliations.with_label_values(&["success"]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_failure(&self, step: Option<ReconcileStep>, elapsed: Duration) {
        self.reconciliations.with_label_values(&["error"]).inc();
        let step = step.map_or("other", |s| s.as_str());
        self.failures.with_label_values(&[step]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        prometheus::TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    #[cfg(test)]
    pub fn failures_for(&self, step: ReconcileStep) -> u64 {
        self.failures.with_label_values(&[step.as_str()]).get()
    }

    #[cfg(test)]
    pub fn passes(&self, result: &str) -> u64 {
        self.reconciliations.with_label_values(&[result]).get()
    }
}

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub metrics: Arc<Metrics>,
    pub ready: Arc<AtomicBool>,
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<HttpState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

/// Router serving the probes and metrics
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the probes and metrics on `addr` until the process exits.
pub async fn serve(addr: SocketAddr, state: HttpState) -> Result<(), ControllerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Watch(format!("failed to bind {}: {}", addr, e)))?;
    info!("Serving probes and metrics on {}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ControllerError::Watch(format!("HTTP server error: {}", e)))
}
