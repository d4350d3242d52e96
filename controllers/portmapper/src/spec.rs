//! Annotation payload model and validation.
//!
//! The payload is a JSON document stored under the controller's annotation on
//! a StatefulSet. [`parse_spec`] decodes and validates it; validation
//! accumulates every violation instead of stopping at the first one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

static NETWORK_FQN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^projects/[^/]+/global/networks/[^/]+$").expect("network regex should compile")
});

static SUBNET_FQN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^projects/[^/]+/regions/[^/]+/subnetworks/[^/]+$").expect("subnet regex should compile")
});

const NETWORK_FORMAT: &str = "projects/<project-id>/global/networks/<network-name>";
const SUBNET_FORMAT: &str = "projects/<project-id>/regions/<region-name>/subnetworks/<subnetwork-name>";

/// Desired exposure of a StatefulSet, read from its annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Prepended to every derived resource name
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub nat_subnet_fqns: Vec<String>,
    #[serde(default)]
    pub consumer_accept_list: Vec<Consumer>,
    /// Explicit forwarding rule address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_access: Option<bool>,
    /// Logical port name to port triple
    #[serde(default, rename = "node_ports")]
    pub named_ports: BTreeMap<String, PortConfig>,
}

/// Service attachment consumer, identified by exactly one of network or project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_fqn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id_or_num: Option<String>,
    #[serde(default)]
    pub connection_limit: u32,
}

impl Consumer {
    pub fn network(&self) -> Option<&str> {
        self.network_fqn.as_deref().filter(|s| !s.is_empty())
    }

    pub fn project(&self) -> Option<&str> {
        self.project_id_or_num.as_deref().filter(|s| !s.is_empty())
    }
}

/// Ports for one named port.
///
/// Replica `i` is reachable on `starting_port + i` at the forwarding rule,
/// which maps to `node_port` on the replica's node, which the exposure
/// service forwards to `container_port`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default)]
    pub node_port: i32,
    #[serde(default)]
    pub container_port: i32,
    #[serde(default)]
    pub starting_port: i32,
}

impl Spec {
    /// Firewall ports: every distinct node port.
    pub fn node_ports(&self) -> Vec<i32> {
        let mut ports: Vec<i32> = self.named_ports.values().map(|p| p.node_port).collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}

/// Every violation found in a payload, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.join("; "))]
pub struct ValidationError(pub Vec<String>);

/// Annotation payload errors
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("couldn't decode the spec from JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid spec: {0}")]
    Invalid(#[from] ValidationError),
}

/// Decode and validate an annotation payload.
pub fn parse_spec(raw: &str) -> Result<Spec, SpecError> {
    let spec: Option<Spec> = serde_json::from_str(raw)?;
    validate_spec(spec.as_ref())?;
    spec.ok_or_else(|| ValidationError(vec!["spec is nil".to_string()]).into())
}

/// Decode an annotation payload without validating it.
///
/// Deletion only needs the resource names, so a payload edited into an
/// invalid state must not keep the workload from going away.
pub fn decode_spec(raw: &str) -> Result<Spec, SpecError> {
    let spec: Option<Spec> = serde_json::from_str(raw)?;
    spec.ok_or_else(|| ValidationError(vec!["spec is nil".to_string()]).into())
}

/// Check consumers, then NAT subnets, then named ports, collecting every violation.
pub fn validate_spec(spec: Option<&Spec>) -> Result<(), ValidationError> {
    let Some(spec) = spec else {
        return Err(ValidationError(vec!["spec is nil".to_string()]));
    };
    let mut errors = Vec::new();

    if spec.consumer_accept_list.is_empty() {
        warn!("consumer_accept_list is empty, no consumer will be able to connect");
    }
    for (i, consumer) in spec.consumer_accept_list.iter().enumerate() {
        match (consumer.network(), consumer.project()) {
            (Some(_), Some(_)) => errors.push(format!(
                "network_fqn and project_id_or_num can't both be set in consumer_list[{}]",
                i
            )),
            (None, None) => errors.push(format!(
                "either network_fqn or project_id_or_num must be set in consumer_list[{}]",
                i
            )),
            (Some(network), None) if !NETWORK_FQN.is_match(network) => errors.push(format!(
                "invalid value for network_fqn ({:?}) in consumer_list[{}], expected format: {}",
                network, i, NETWORK_FORMAT
            )),
            _ => {}
        }
        if consumer.connection_limit == 0 {
            warn!("connection_limit is 0 in consumer_list[{}], it will not be able to connect", i);
        }
    }

    if spec.nat_subnet_fqns.is_empty() {
        errors.push("nat_subnet_fqns is empty".to_string());
    }
    for (i, subnet) in spec.nat_subnet_fqns.iter().enumerate() {
        if !SUBNET_FQN.is_match(subnet) {
            errors.push(format!(
                "invalid value for nat_subnet_fqns[{}] ({:?}), expected format: {}",
                i, subnet, SUBNET_FORMAT
            ));
        }
    }

    for (name, ports) in &spec.named_ports {
        for (field, value) in [
            ("node_port", ports.node_port),
            ("container_port", ports.container_port),
            ("starting_port", ports.starting_port),
        ] {
            if !(1..=65535).contains(&value) {
                errors.push(format!(
                    "invalid value for node_ports[{:?}].{} ({}), expected a port between 1 and 65535",
                    name, field, value
                ));
            }
        }
    }

    let mut by_start: BTreeMap<i32, &str> = BTreeMap::new();
    for (name, ports) in &spec.named_ports {
        if let Some(other) = by_start.insert(ports.starting_port, name) {
            errors.push(format!(
                "node_ports[{:?}] and node_ports[{:?}] share starting_port {}",
                other, name, ports.starting_port
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError(errors))
    }
}

#[cfg(test)]
#[path = "spec_test.rs"]
mod tests;
