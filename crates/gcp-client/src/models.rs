//! Compute Engine API models
//!
//! These models match the Compute Engine v1 REST resources the port mapper
//! manages. Only the fields the controller reads or writes are modelled;
//! everything else the API returns is ignored on deserialization.
//! See: https://cloud.google.com/compute/docs/reference/rest/v1

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Network endpoint type used for the port-mapping endpoint group.
pub const PORTMAP_ENDPOINT_TYPE: &str = "GCE_VM_IP_PORTMAP";

/// Single endpoint registration on a port-mapping NEG.
///
/// Traffic arriving at the forwarding rule on `port` is delivered to
/// `instance_port` on `instance`. Two mappings are the same registration
/// iff all three fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortMapping {
    /// Client destination port (the externally visible port)
    pub port: i32,
    /// Instance reference (`projects/<p>/zones/<z>/instances/<n>`)
    pub instance: String,
    /// Port on the instance (the node port)
    pub instance_port: i32,
}

/// Firewall rule
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<FirewallAllowed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Allow clause of a firewall rule
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol", default, skip_serializing_if = "Option::is_none")]
    pub ip_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// Regional network endpoint group
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpointGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_endpoint_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Network endpoint as sent to attach/detach and returned by list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_destination_port: Option<i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// One item of `listNetworkEndpoints`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpointWithHealthStatus {
    pub network_endpoint: NetworkEndpoint,
}

/// Page of `listNetworkEndpoints`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpointsPage {
    #[serde(default)]
    pub items: Vec<NetworkEndpointWithHealthStatus>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Regional backend service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendService {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<Backend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Backend entry of a backend service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balancing_mode: Option<String>,
}

/// Regional forwarding rule
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingRule {
    pub name: String,
    #[serde(rename = "IPAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "IPProtocol", default, skip_serializing_if = "Option::is_none")]
    pub ip_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_global_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_ports: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Private Service Connect service attachment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAttachment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_forwarding_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_preference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumer_accept_lists: Vec<ConsumerProjectLimit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nat_subnets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_proxy_protocol: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Consumer accept-list entry of a service attachment
///
/// Exactly one of `project_id_or_num` and `network_url` is expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerProjectLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id_or_num: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_url: Option<String>,
    #[serde(default)]
    pub connection_limit: u32,
}

/// Long-running operation returned by every mutating call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub target_link: Option<String>,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub http_error_status_code: Option<u16>,
    #[serde(default)]
    pub http_error_message: Option<String>,
}

impl Operation {
    /// Whether the operation has finished (successfully or not).
    pub fn is_done(&self) -> bool {
        self.status.as_deref() == Some("DONE")
    }
}

/// Errors attached to a finished operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorItem>,
}

/// Single error entry of an operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error envelope of a failed Google API call
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleErrorResponse {
    pub error: GoogleErrorBody,
}

/// Body of a Google API error
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}
