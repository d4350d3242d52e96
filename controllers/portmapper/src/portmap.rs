//! Replica ordering, instance resolution and port-mapping arithmetic.
//!
//! Everything here is pure: the reconciler feeds it the listed pods and the
//! resolved nodes and gets back the endpoint set the NEG should hold.

use crate::error::ControllerError;
use crate::spec::PortConfig;
use gcp_client::{instance_fqn, PortMapping};
use k8s_openapi::api::core::v1::Pod;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::info;

/// Label the StatefulSet controller stamps with the replica ordinal
pub const POD_INDEX_LABEL: &str = "apps.kubernetes.io/pod-index";

static PROVIDER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9+.-]*://([^/]+)/([^/]+)/([^/]+)$")
        .expect("provider id regex should compile")
});

/// A replica that has been bound to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReplica {
    pub pod: String,
    pub node: String,
}

/// Replica ordinal, from the pod-index label or the pod name suffix.
pub fn ordinal(pod: &Pod) -> Option<u32> {
    let from_label = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(POD_INDEX_LABEL))
        .and_then(|v| v.parse().ok());
    from_label.or_else(|| {
        pod.metadata
            .name
            .as_deref()
            .and_then(|n| n.rsplit_once('-'))
            .and_then(|(_, suffix)| suffix.parse().ok())
    })
}

/// Sort pods by ordinal and drop the ones not yet bound to a node.
///
/// The position in the returned list is the replica's port offset.
pub fn scheduled_replicas(mut pods: Vec<Pod>) -> Vec<ScheduledReplica> {
    pods.sort_by(|a, b| {
        (ordinal(a).unwrap_or(u32::MAX), a.metadata.name.as_deref())
            .cmp(&(ordinal(b).unwrap_or(u32::MAX), b.metadata.name.as_deref()))
    });

    pods.into_iter()
        .filter_map(|pod| {
            let name = pod.metadata.name.clone().unwrap_or_default();
            match pod.spec.and_then(|s| s.node_name).filter(|n| !n.is_empty()) {
                Some(node) => Some(ScheduledReplica { pod: name, node }),
                None => {
                    info!("Skipping unscheduled pod {}", name);
                    None
                }
            }
        })
        .collect()
}

/// Turn `gce://<project>/<zone>/<name>` into an instance resource path.
pub fn instance_from_provider_id(
    node: &str,
    provider_id: Option<&str>,
) -> Result<String, ControllerError> {
    let provider_id = provider_id.unwrap_or_default();
    let captures = PROVIDER_ID
        .captures(provider_id)
        .ok_or_else(|| ControllerError::InvalidProviderId {
            node: node.to_string(),
            provider_id: provider_id.to_string(),
        })?;
    Ok(instance_fqn(&captures[1], &captures[2], &captures[3]))
}

/// Highest port number a forwarding rule accepts
const MAX_PORT: i32 = 65535;

/// One mapping per (replica, named port): `starting_port + i` to `node_port` on replica `i`'s instance.
///
/// Fails when a named port's run of external ports passes 65535 or when two
/// runs overlap for the current replica count.
pub fn port_mappings(
    named_ports: &BTreeMap<String, PortConfig>,
    instances: &[String],
) -> Result<Vec<PortMapping>, ControllerError> {
    let replicas = i32::try_from(instances.len())
        .map_err(|_| ControllerError::PortMapping(format!("{} replicas", instances.len())))?;
    if replicas > 0 {
        check_port_runs(named_ports, replicas)?;
    }

    Ok(instances
        .iter()
        .zip(0i32..)
        .flat_map(|(instance, i)| {
            named_ports.values().map(move |ports| PortMapping {
                port: ports.starting_port + i,
                instance: instance.clone(),
                instance_port: ports.node_port,
            })
        })
        .collect())
}

fn check_port_runs(
    named_ports: &BTreeMap<String, PortConfig>,
    replicas: i32,
) -> Result<(), ControllerError> {
    let mut runs: Vec<(i32, i32, &str)> = named_ports
        .iter()
        .map(|(name, ports)| (ports.starting_port, ports.starting_port + replicas - 1, name.as_str()))
        .collect();
    runs.sort_unstable();

    for &(first, last, name) in &runs {
        if last > MAX_PORT {
            return Err(ControllerError::PortMapping(format!(
                "node_ports[{:?}] needs ports {}-{} for {} replica(s), past {}",
                name, first, last, replicas, MAX_PORT
            )));
        }
    }
    for pair in runs.windows(2) {
        let ((_, prev_last, prev), (next_first, _, next)) = (pair[0], pair[1]);
        if next_first <= prev_last {
            return Err(ControllerError::PortMapping(format!(
                "node_ports[{:?}] and node_ports[{:?}] overlap at port {} with {} replica(s)",
                prev, next, next_first, replicas
            )));
        }
    }
    Ok(())
}

/// Registered endpoints that are not desired: `actual \ desired`.
pub fn obsolete(desired: &[PortMapping], actual: &[PortMapping]) -> Vec<PortMapping> {
    difference(actual, desired)
}

/// Desired endpoints that are not registered: `desired \ actual`.
pub fn missing(desired: &[PortMapping], actual: &[PortMapping]) -> Vec<PortMapping> {
    difference(desired, actual)
}

fn difference(from: &[PortMapping], remove: &[PortMapping]) -> Vec<PortMapping> {
    let remove: HashSet<&PortMapping> = remove.iter().collect();
    from.iter().filter(|m| !remove.contains(m)).cloned().collect()
}
