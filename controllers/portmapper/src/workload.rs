//! Kubernetes side of the controller.
//!
//! `WorkloadClient` is the seam between the reconciler and the cluster: the
//! StatefulSet, its pods, their nodes, the exposure service and the
//! finalizer. Tests swap in an in-memory implementation.

use crate::error::ControllerError;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::debug;

/// Cluster operations the reconciler needs
#[async_trait::async_trait]
pub trait WorkloadClient: Send + Sync {
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>, ControllerError>;

    async fn list_pods(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError>;

    async fn get_node(&self, name: &str) -> Result<Node, ControllerError>;

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError>;

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), ControllerError>;

    /// Replace an existing service; `service` must carry the observed resource version.
    async fn update_service(&self, namespace: &str, service: &Service) -> Result<(), ControllerError>;

    /// Delete a service; a missing service is not an error.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    /// Add `finalizer` to the StatefulSet unless already present
    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), ControllerError>;

    /// Remove `finalizer` from the StatefulSet if present
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), ControllerError>;
}

/// Render `matchLabels` as a label selector string.
pub fn label_selector(match_labels: &BTreeMap<String, String>) -> String {
    match_labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// `WorkloadClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeWorkloadClient {
    client: Client,
}

impl KubeWorkloadClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), ControllerError> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.stateful_sets(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkloadClient for KubeWorkloadClient {
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>, ControllerError> {
        Ok(self.stateful_sets(namespace).get_opt(name).await?)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(match_labels));
        Ok(api.list(&params).await?.items)
    }

    async fn get_node(&self, name: &str) -> Result<Node, ControllerError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ControllerError> {
        Ok(self.services(namespace).get_opt(name).await?)
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<(), ControllerError> {
        self.services(namespace)
            .create(&PostParams::default(), service)
            .await?;
        Ok(())
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<(), ControllerError> {
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::Workload("service has no name".to_string()))?;
        self.services(namespace)
            .replace(name, &PostParams::default(), service)
            .await?;
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        match self
            .services(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!("Service {}/{} already deleted", namespace, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), ControllerError> {
        let sts = self.stateful_sets(namespace).get(name).await?;
        let mut finalizers = sts.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(namespace, name, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), ControllerError> {
        let sts = self.stateful_sets(namespace).get(name).await?;
        let finalizers = sts.metadata.finalizers.unwrap_or_default();
        if !finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let remaining = finalizers.into_iter().filter(|f| f != finalizer).collect();
        self.patch_finalizers(namespace, name, remaining).await
    }
}
