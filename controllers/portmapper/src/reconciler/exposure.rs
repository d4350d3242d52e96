//! NodePort service exposing each named port on every node.

use super::Reconciler;
use crate::error::ControllerError;
use crate::spec::Spec;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "psc-portmapper";

const SERVICE_TYPE: &str = "NodePort";
const TRAFFIC_POLICY: &str = "Local";
const PROTOCOL: &str = "TCP";

/// Desired exposure service for `sts`.
pub(crate) fn desired_service(
    sts: &StatefulSet,
    namespace: &str,
    name: &str,
    selector: &BTreeMap<String, String>,
    spec: &Spec,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            owner_references: sts.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(SERVICE_TYPE.to_string()),
            external_traffic_policy: Some(TRAFFIC_POLICY.to_string()),
            selector: Some(selector.clone()),
            ports: Some(
                spec.named_ports
                    .iter()
                    .map(|(port_name, ports)| ServicePort {
                        name: Some(port_name.clone()),
                        port: ports.container_port,
                        target_port: Some(IntOrString::Int(ports.container_port)),
                        node_port: Some(ports.node_port),
                        protocol: Some(PROTOCOL.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

type PortKey = (Option<String>, i32, Option<IntOrString>, Option<i32>, String);

fn port_keys(service: &Service) -> Vec<PortKey> {
    let mut keys: Vec<PortKey> = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .into_iter()
        .flatten()
        .map(|p| {
            (
                p.name.clone(),
                p.port,
                p.target_port.clone(),
                p.node_port,
                p.protocol.clone().unwrap_or_else(|| PROTOCOL.to_string()),
            )
        })
        .collect();
    keys.sort_by(|a, b| (&a.0, a.1, a.3).cmp(&(&b.0, b.1, b.3)));
    keys
}

/// Whether `existing` deviates from `desired` in any field the controller owns.
pub(crate) fn service_drifted(existing: &Service, desired: &Service) -> bool {
    let label = |s: &Service| {
        s.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(MANAGED_BY_LABEL))
            .cloned()
    };
    let observed = existing.spec.clone().unwrap_or_default();
    let wanted = desired.spec.clone().unwrap_or_default();

    label(existing) != label(desired)
        || observed.type_ != wanted.type_
        || observed.external_traffic_policy != wanted.external_traffic_policy
        || observed.selector != wanted.selector
        || port_keys(existing) != port_keys(desired)
}

impl Reconciler {
    /// Create the exposure service, or bring an existing one back in line.
    pub(super) async fn ensure_exposure_service(
        &self,
        sts: &StatefulSet,
        namespace: &str,
        name: &str,
        selector: &BTreeMap<String, String>,
        spec: &Spec,
    ) -> Result<(), ControllerError> {
        let desired = desired_service(sts, namespace, name, selector, spec);

        let Some(existing) = self.workloads.get_service(namespace, name).await? else {
            info!("Creating exposure service {}/{}", namespace, name);
            return self.workloads.create_service(namespace, &desired).await;
        };

        if !service_drifted(&existing, &desired) {
            debug!("Exposure service {}/{} already up-to-date", namespace, name);
            return Ok(());
        }

        info!("Updating exposure service {}/{}", namespace, name);
        let mut updated = existing;
        updated
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        if updated.metadata.owner_references.is_none() {
            updated.metadata.owner_references = desired.metadata.owner_references;
        }
        let desired_spec = desired.spec.unwrap_or_default();
        let spec = updated.spec.get_or_insert_with(ServiceSpec::default);
        spec.type_ = desired_spec.type_;
        spec.external_traffic_policy = desired_spec.external_traffic_policy;
        spec.selector = desired_spec.selector;
        spec.ports = desired_spec.ports;
        self.workloads.update_service(namespace, &updated).await
    }
}
