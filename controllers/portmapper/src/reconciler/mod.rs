//! StatefulSet reconciliation
//!
//! One pass re-derives everything from the StatefulSet and its annotation:
//! finalizer, spec, exposure service, replica nodes, then the Compute chain
//! (firewall, NEG, backend service, endpoints, forwarding rule, service
//! attachment). A StatefulSet marked for deletion walks the chain backwards
//! instead and releases the finalizer last.

mod chain;
mod exposure;
mod replicas;
mod teardown;

use crate::error::{at, ControllerError, ReconcileStep};
use crate::metrics::Metrics;
use crate::portmap;
use crate::spec::parse_spec;
use crate::trigger;
use crate::workload::WorkloadClient;
use gcp_client::GcpClientTrait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Finalizer that guards the Compute resources of a managed StatefulSet
pub const FINALIZER: &str = "0x5d.org/psc-portmapper-finalizer";

/// Names of every resource derived from a spec's `prefix`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub service: String,
    pub firewall: String,
    pub neg: String,
    pub backend: String,
    pub forwarding_rule: String,
    pub service_attachment: String,
}

impl ResourceNames {
    pub fn new(prefix: &str) -> Self {
        let name = |suffix: &str| format!("{}psc-portmapper-{}", prefix, suffix);
        Self {
            service: name("nodeport"),
            firewall: name("firewall"),
            neg: name("neg"),
            backend: name("backend"),
            forwarding_rule: name("forwarding-rule"),
            service_attachment: name("service-attachment"),
        }
    }
}

/// Tunables of a reconciliation pass
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Delay before a failed pass is retried
    pub requeue_delay: Duration,
    /// Deadline for a whole pass
    pub timeout: Duration,
    /// Maximum node lookups in flight
    pub node_lookup_concurrency: usize,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            requeue_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(300),
            node_lookup_concurrency: 8,
        }
    }
}

/// Reconciler shared by every reconciliation of the controller
pub struct Reconciler {
    gcp: Arc<dyn GcpClientTrait>,
    workloads: Arc<dyn WorkloadClient>,
    settings: ReconcilerSettings,
    metrics: Arc<Metrics>,
}

impl Reconciler {
    pub fn new(
        gcp: Arc<dyn GcpClientTrait>,
        workloads: Arc<dyn WorkloadClient>,
        settings: ReconcilerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gcp,
            workloads,
            settings,
            metrics,
        }
    }

    /// Delay before a failed pass is retried
    pub fn requeue_delay(&self) -> Duration {
        self.settings.requeue_delay
    }

    /// Run one pass for `sts` under the configured deadline and record its outcome.
    pub async fn reconcile(&self, sts: &StatefulSet) -> Result<Action, ControllerError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.settings.timeout, self.reconcile_pass(sts)).await {
            Ok(result) => result,
            Err(_) => Err(ControllerError::Timeout(self.settings.timeout)),
        };

        match &result {
            Ok(_) => self.metrics.record_success(started.elapsed()),
            Err(e) => self.metrics.record_failure(e.step(), started.elapsed()),
        }
        result
    }

    async fn reconcile_pass(&self, sts: &StatefulSet) -> Result<Action, ControllerError> {
        if !trigger::is_annotated(sts) && !has_finalizer(sts) {
            return Ok(Action::await_change());
        }
        let namespace = sts
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| ControllerError::Workload("StatefulSet has no namespace".to_string()))?;
        let name = sts
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::Workload("StatefulSet has no name".to_string()))?;

        // The watch event may be stale; act on the current object.
        let Some(current) = self.workloads.get_stateful_set(namespace, name).await? else {
            debug!("StatefulSet {}/{} no longer exists", namespace, name);
            return Ok(Action::await_change());
        };
        let Some(raw) = trigger::annotation_value(&current) else {
            if has_finalizer(&current) {
                return self.release_unmanaged(namespace, name).await;
            }
            debug!("StatefulSet {}/{} is no longer annotated", namespace, name);
            return Ok(Action::await_change());
        };

        if current.metadata.deletion_timestamp.is_some() {
            return self.teardown(&current, namespace, name, raw).await;
        }
        self.apply(&current, namespace, name, raw).await
    }

    async fn apply(
        &self,
        sts: &StatefulSet,
        namespace: &str,
        name: &str,
        raw: &str,
    ) -> Result<Action, ControllerError> {
        if !has_finalizer(sts) {
            info!("Adding finalizer to StatefulSet {}/{}", namespace, name);
            self.workloads
                .add_finalizer(namespace, name, FINALIZER)
                .await
                .map_err(at(ReconcileStep::Finalizer))?;
        }

        let spec = parse_spec(raw).map_err(at(ReconcileStep::Spec))?;
        if spec.named_ports.is_empty() {
            warn!(
                "StatefulSet {}/{} declares no node_ports, nothing to expose",
                namespace, name
            );
            return Ok(Action::await_change());
        }
        let names = ResourceNames::new(&spec.prefix);
        let selector = match_labels(sts).map_err(at(ReconcileStep::ExposureService))?;

        self.ensure_exposure_service(sts, namespace, &names.service, &selector, &spec)
            .await
            .map_err(at(ReconcileStep::ExposureService))?;

        let instances = self
            .resolve_replica_instances(namespace, &selector)
            .await
            .map_err(at(ReconcileStep::ReplicaNodes))?;
        let mappings =
            portmap::port_mappings(&spec.named_ports, &instances).map_err(at(ReconcileStep::Spec))?;

        self.reconcile_chain(&names, &spec, &mappings).await?;

        info!(
            "Reconciled StatefulSet {}/{}: {} replica(s), {} endpoint(s)",
            namespace,
            name,
            instances.len(),
            mappings.len()
        );
        Ok(Action::await_change())
    }
}

/// Whether the StatefulSet carries the controller's finalizer
pub fn has_finalizer(sts: &StatefulSet) -> bool {
    sts.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == FINALIZER))
}

fn match_labels(sts: &StatefulSet) -> Result<BTreeMap<String, String>, ControllerError> {
    sts.spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.clone())
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| ControllerError::Workload("StatefulSet selector has no matchLabels".to_string()))
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
