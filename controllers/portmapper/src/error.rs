//! Controller-specific error types.
//!
//! Every error that aborts a reconciliation pass is wrapped in
//! [`ControllerError::Step`] so the logged error and the failure metric name
//! the resource the pass got stuck on.

use crate::spec::SpecError;
use gcp_client::GcpError;
use kube::Error as KubeError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stage of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStep {
    Finalizer,
    Spec,
    ExposureService,
    ReplicaNodes,
    Firewall,
    EndpointGroup,
    Backend,
    Endpoints,
    ForwardingRule,
    ServiceAttachment,
}

impl ReconcileStep {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStep::Finalizer => "finalizer",
            ReconcileStep::Spec => "spec",
            ReconcileStep::ExposureService => "exposure_service",
            ReconcileStep::ReplicaNodes => "replica_nodes",
            ReconcileStep::Firewall => "firewall",
            ReconcileStep::EndpointGroup => "endpoint_group",
            ReconcileStep::Backend => "backend",
            ReconcileStep::Endpoints => "endpoints",
            ReconcileStep::ForwardingRule => "forwarding_rule",
            ReconcileStep::ServiceAttachment => "service_attachment",
        }
    }
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the port mapper controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Compute API error
    #[error("GCP error: {0}")]
    Gcp(#[from] GcpError),

    /// Annotation could not be decoded or failed validation
    #[error("{0}")]
    Spec(#[from] SpecError),

    /// Node provider ID is not `<scheme>://<project>/<zone>/<name>`
    #[error("node {node} has an unexpected provider ID {provider_id:?}")]
    InvalidProviderId { node: String, provider_id: String },

    /// External ports of the replicas don't fit the payload's port runs
    #[error("Port mapping error: {0}")]
    PortMapping(String),

    /// Workload object is missing something the controller relies on
    #[error("Workload error: {0}")]
    Workload(String),

    /// A reconciliation step failed
    #[error("{step}: {source}")]
    Step {
        step: ReconcileStep,
        #[source]
        source: Box<ControllerError>,
    },

    /// Reconciliation pass exceeded its deadline
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch or HTTP server failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Step the error was raised in, if it was tagged with one.
    pub fn step(&self) -> Option<ReconcileStep> {
        match self {
            ControllerError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether the underlying cause is a remote NotFound
    #[cfg(test)]
    pub fn is_not_found(&self) -> bool {
        match self {
            ControllerError::Gcp(e) => e.is_not_found(),
            ControllerError::Step { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Tag an error with the step that produced it, for use with `map_err`.
pub fn at<E: Into<ControllerError>>(step: ReconcileStep) -> impl FnOnce(E) -> ControllerError {
    move |e| ControllerError::Step {
        step,
        source: Box::new(e.into()),
    }
}
