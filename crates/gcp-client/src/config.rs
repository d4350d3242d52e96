//! Client configuration
//!
//! Scopes every call the client makes to one project, region, VPC network and
//! subnetwork. Network and subnetwork may be given as bare names, full
//! resource paths or API URLs; [`ClientConfig::new`] normalizes them to
//! resource paths.

use std::collections::BTreeMap;

/// Default Compute Engine REST endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// Scope of every Compute API call made by the client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub project: String,
    pub region: String,
    /// `projects/<p>/global/networks/<n>`
    pub network: String,
    /// `projects/<p>/regions/<r>/subnetworks/<s>`
    pub subnet: String,
    /// Annotations stamped on every endpoint group created by the client
    pub annotations: BTreeMap<String, String>,
    pub api_endpoint: String,
}

impl ClientConfig {
    /// Build a configuration, normalizing `network` and `subnet` to resource paths.
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        network: &str,
        subnet: &str,
    ) -> Self {
        let project = project.into();
        let region = region.into();
        let network = normalize_network(&project, network);
        let subnet = normalize_subnet(&project, &region, subnet);
        Self {
            project,
            region,
            network,
            subnet,
            annotations: BTreeMap::new(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
        }
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

/// Strip any URL prefix in front of `projects/...`.
pub fn relative_resource_name(value: &str) -> &str {
    match value.find("projects/") {
        Some(idx) => &value[idx..],
        None => value,
    }
}

fn normalize_network(project: &str, network: &str) -> String {
    if network.contains("projects/") {
        relative_resource_name(network).to_string()
    } else {
        format!("projects/{}/global/networks/{}", project, network)
    }
}

fn normalize_subnet(project: &str, region: &str, subnet: &str) -> String {
    if subnet.contains("projects/") {
        relative_resource_name(subnet).to_string()
    } else {
        format!("projects/{}/regions/{}/subnetworks/{}", project, region, subnet)
    }
}

/// Parse `k=v,k=v` into an annotation map. Empty segments are skipped.
pub fn parse_annotations(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let mut annotations = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                annotations.insert(k.trim().to_string(), v.trim().to_string());
            }
            _ => return Err(format!("invalid annotation {:?}, expected key=value", pair)),
        }
    }
    Ok(annotations)
}
