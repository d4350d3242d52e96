//! Test utilities for unit testing the reconciler
//!
//! Builders for StatefulSets, pods and nodes, and an in-memory
//! [`WorkloadClient`] that records every call it receives.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::portmap::POD_INDEX_LABEL;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::trigger::ANNOTATION;
use crate::workload::WorkloadClient;
use gcp_client::MockGcpClient;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const TEST_PROJECT: &str = "proj";
pub const TEST_REGION: &str = "us-east1";
pub const TEST_ZONE: &str = "us-east1-b";

/// Annotation with one named port `app` (node port 30000, starting port 30000)
pub fn test_annotation(prefix: &str) -> String {
    serde_json::json!({
        "prefix": prefix,
        "nat_subnet_fqns": ["projects/proj/regions/us-east1/subnetworks/psc-nat"],
        "consumer_accept_list": [],
        "node_ports": {
            "app": {"node_port": 30000, "container_port": 8080, "starting_port": 30000}
        }
    })
    .to_string()
}

/// StatefulSet selecting pods labelled `app=<name>`
pub fn create_test_stateful_set(namespace: &str, name: &str, annotation: Option<&str>) -> StatefulSet {
    let mut annotations = serde_json::Map::new();
    if let Some(value) = annotation {
        annotations.insert(ANNOTATION.to_string(), value.into());
    }
    serde_json::from_value(serde_json::json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("{}-uid", name),
            "annotations": annotations,
        },
        "spec": {
            "selector": {"matchLabels": {"app": name}},
            "serviceName": name,
            "template": {"metadata": {"labels": {"app": name}}}
        }
    }))
    .unwrap()
}

/// Same StatefulSet with a deletion timestamp set
pub fn marked_for_deletion(sts: StatefulSet) -> StatefulSet {
    let mut value = serde_json::to_value(sts).unwrap();
    value["metadata"]["deletionTimestamp"] = "2024-01-01T00:00:00Z".into();
    serde_json::from_value(value).unwrap()
}

/// Same StatefulSet carrying `finalizer`
pub fn with_finalizer(mut sts: StatefulSet, finalizer: &str) -> StatefulSet {
    sts.metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    sts
}

/// Replica `<app>-<ordinal>`, scheduled on `node` when given
pub fn create_test_pod(namespace: &str, app: &str, ordinal: u32, node: Option<&str>) -> Pod {
    serde_json::from_value(serde_json::json!({
        "metadata": {
            "name": format!("{}-{}", app, ordinal),
            "namespace": namespace,
            "labels": {"app": app, POD_INDEX_LABEL: ordinal.to_string()}
        },
        "spec": {
            "containers": [],
            "nodeName": node
        }
    }))
    .unwrap()
}

/// Node with a GCE provider ID in the test project and zone
pub fn create_test_node(name: &str) -> Node {
    create_test_node_with_provider_id(name, &format!("gce://{}/{}/{}", TEST_PROJECT, TEST_ZONE, name))
}

pub fn create_test_node_with_provider_id(name: &str, provider_id: &str) -> Node {
    serde_json::from_value(serde_json::json!({
        "metadata": {"name": name},
        "spec": {"providerID": provider_id}
    }))
    .unwrap()
}

/// Instance path the reconciler derives for a test node
pub fn test_instance(node: &str) -> String {
    format!("projects/{}/zones/{}/instances/{}", TEST_PROJECT, TEST_ZONE, node)
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// In-memory cluster
#[derive(Clone, Default)]
pub struct InMemoryWorkloads {
    stateful_sets: Arc<Mutex<HashMap<Key, StatefulSet>>>,
    pods: Arc<Mutex<Vec<Pod>>>,
    nodes: Arc<Mutex<HashMap<String, Node>>>,
    services: Arc<Mutex<HashMap<Key, Service>>>,
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashSet<&'static str>>>,
}

impl InMemoryWorkloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stateful_set(&self, sts: StatefulSet) {
        let k = key(
            sts.metadata.namespace.as_deref().unwrap_or_default(),
            sts.metadata.name.as_deref().unwrap_or_default(),
        );
        self.stateful_sets.lock().unwrap().insert(k, sts);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.pods.lock().unwrap().push(pod);
    }

    pub fn remove_pod(&self, name: &str) {
        self.pods
            .lock()
            .unwrap()
            .retain(|pod| pod.metadata.name.as_deref() != Some(name));
    }

    pub fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node);
    }

    pub fn add_service(&self, namespace: &str, service: Service) {
        let name = service.metadata.name.clone().unwrap_or_default();
        self.services.lock().unwrap().insert(key(namespace, &name), service);
    }

    pub fn stateful_set(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.stateful_sets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn finalizers(&self, namespace: &str, name: &str) -> Vec<String> {
        self.stateful_set(namespace, name)
            .and_then(|sts| sts.metadata.finalizers)
            .unwrap_or_default()
    }

    /// Make every later call to `method` fail
    pub fn fail_on(&self, method: &'static str) {
        self.failures.lock().unwrap().insert(method);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change cluster state, in order
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get_") && !c.starts_with("list_"))
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, method: &'static str) -> Result<(), ControllerError> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.failures.lock().unwrap().contains(method) {
            return Err(ControllerError::Workload(format!("injected failure in {}", method)));
        }
        Ok(())
    }

    fn update_finalizers<F>(&self, namespace: &str, name: &str, edit: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Vec<String>),
    {
        let mut stateful_sets = self.stateful_sets.lock().unwrap();
        let sts = stateful_sets
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ControllerError::Workload(format!("StatefulSet {}/{} not found", namespace, name)))?;
        edit(sts.metadata.finalizers.get_or_insert_with(Vec::new));
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkloadClient for InMemoryWorkloads {
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>, ControllerError> {
        self.record("get_stateful_set")?;
        Ok(self.stateful_set(namespace, name))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError> {
        self.record("list_pods")?;
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| {
                let labels = pod.metadata.labels.clone().unwrap_or_default();
                match_labels.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }

    async fn get_node(&self, name: &str) -> Result<Node, ControllerError> {
        self.record("get_node")?;
        self.nodes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ControllerError::Workload(format!("node {} not found", name)))
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError> {
        self.record("get_service")?;
        Ok(self.service(namespace, name))
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), ControllerError> {
        self.record("create_service")?;
        let name = service.metadata.name.clone().unwrap_or_default();
        let mut services = self.services.lock().unwrap();
        if services.contains_key(&key(namespace, &name)) {
            return Err(ControllerError::Workload(format!("service {}/{} already exists", namespace, name)));
        }
        let mut stored = service.clone();
        stored.metadata.resource_version = Some("1".to_string());
        services.insert(key(namespace, &name), stored);
        Ok(())
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<(), ControllerError> {
        self.record("update_service")?;
        let name = service.metadata.name.clone().unwrap_or_default();
        self.services
            .lock()
            .unwrap()
            .insert(key(namespace, &name), service.clone());
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.record("delete_service")?;
        self.services.lock().unwrap().remove(&key(namespace, name));
        Ok(())
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), ControllerError> {
        self.record("add_finalizer")?;
        self.update_finalizers(namespace, name, |finalizers| {
            if !finalizers.iter().any(|f| f == finalizer) {
                finalizers.push(finalizer.to_string());
            }
        })
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), ControllerError> {
        self.record("remove_finalizer")?;
        self.update_finalizers(namespace, name, |finalizers| {
            finalizers.retain(|f| f != finalizer);
        })
    }
}

/// Reconciler wired to the given fakes with default settings
pub fn create_test_reconciler(gcp: &MockGcpClient, workloads: &InMemoryWorkloads) -> (Reconciler, Arc<Metrics>) {
    create_test_reconciler_with_settings(gcp, workloads, ReconcilerSettings::default())
}

pub fn create_test_reconciler_with_settings(
    gcp: &MockGcpClient,
    workloads: &InMemoryWorkloads,
    settings: ReconcilerSettings,
) -> (Reconciler, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().unwrap());
    let reconciler = Reconciler::new(
        Arc::new(gcp.clone()),
        Arc::new(workloads.clone()),
        settings,
        metrics.clone(),
    );
    (reconciler, metrics)
}
