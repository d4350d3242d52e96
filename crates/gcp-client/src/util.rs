//! Resource naming helpers and the firewall staleness predicate

use crate::models::Firewall;

pub fn network_fqn(project: &str, network: &str) -> String {
    format!("projects/{}/global/networks/{}", project, network)
}

pub fn subnet_fqn(project: &str, region: &str, subnet: &str) -> String {
    format!("projects/{}/regions/{}/subnetworks/{}", project, region, subnet)
}

pub fn instance_fqn(project: &str, zone: &str, instance: &str) -> String {
    format!("projects/{}/zones/{}/instances/{}", project, zone, instance)
}

pub fn neg_fqn(project: &str, region: &str, name: &str) -> String {
    format!("projects/{}/regions/{}/networkEndpointGroups/{}", project, region, name)
}

pub fn backend_service_fqn(project: &str, region: &str, name: &str) -> String {
    format!("projects/{}/regions/{}/backendServices/{}", project, region, name)
}

pub fn forwarding_rule_fqn(project: &str, region: &str, name: &str) -> String {
    format!("projects/{}/regions/{}/forwardingRules/{}", project, region, name)
}

pub fn service_attachment_fqn(project: &str, region: &str, name: &str) -> String {
    format!("projects/{}/regions/{}/serviceAttachments/{}", project, region, name)
}

/// Ports rendered the way the firewall API stores them, sorted as strings.
pub fn port_strings(ports: &[i32]) -> Vec<String> {
    let mut rendered: Vec<String> = ports.iter().map(i32::to_string).collect();
    rendered.sort();
    rendered
}

/// Whether `firewall` differs from a single TCP clause allowing exactly `ports`.
///
/// Ports are compared as sorted string lists, so duplicates count.
pub fn firewall_needs_update(firewall: &Firewall, ports: &[i32]) -> bool {
    let [allowed] = firewall.allowed.as_slice() else {
        return true;
    };
    if !allowed
        .ip_protocol
        .as_deref()
        .is_some_and(|p| p.eq_ignore_ascii_case("tcp"))
    {
        return true;
    }

    let mut actual = allowed.ports.clone();
    actual.sort();
    actual != port_strings(ports)
}
