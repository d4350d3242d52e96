use super::Reconciler;
use crate::error::ControllerError;
use crate::portmap;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Instance path of the node hosting each scheduled replica, in ordinal order.
    ///
    /// Lookups run concurrently up to the configured limit; any failed lookup
    /// fails the whole batch.
    pub(super) async fn resolve_replica_instances(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ControllerError> {
        let pods = self.workloads.list_pods(namespace, selector).await?;
        if pods.is_empty() {
            info!(
                "No pods match {:?} in {}, is the StatefulSet scaled to zero?",
                selector, namespace
            );
        }
        let replicas = portmap::scheduled_replicas(pods);
        debug!("{} scheduled replica(s) in {}", replicas.len(), namespace);

        let workloads = &self.workloads;
        stream::iter(replicas)
            .map(|replica| async move {
                let node = workloads.get_node(&replica.node).await.map_err(|e| {
                    warn!("Failed to get node {} of pod {}: {}", replica.node, replica.pod, e);
                    e
                })?;
                let provider_id = node.spec.as_ref().and_then(|spec| spec.provider_id.as_deref());
                portmap::instance_from_provider_id(&replica.node, provider_id)
            })
            .buffered(self.settings.node_lookup_concurrency.max(1))
            .try_collect()
            .await
    }
}
