//! Mock GcpClient for unit testing
//!
//! In-memory implementation of [`GcpClientTrait`]. It keeps one store per
//! resource type, records every call in order and lets tests inject failures
//! per method. Missing resources yield `GcpError::NotFound` exactly like the
//! REST client, inserting an existing name yields `GcpError::AlreadyExists`,
//! and references between resources are checked on create and delete.

use crate::error::GcpError;
use crate::gcp_trait::GcpClientTrait;
use crate::models::*;
use crate::util::{backend_service_fqn, forwarding_rule_fqn, neg_fqn, port_strings};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A call recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub method: &'static str,
    pub target: String,
}

impl MockCall {
    /// Whether the call changes remote state
    pub fn is_mutating(&self) -> bool {
        !(self.method.starts_with("get_") || self.method.starts_with("list_"))
    }
}

/// Mock GcpClient for testing
#[derive(Debug, Clone)]
pub struct MockGcpClient {
    project: String,
    region: String,
    pub(crate) firewalls: Arc<Mutex<HashMap<String, Firewall>>>,
    pub(crate) negs: Arc<Mutex<HashMap<String, NetworkEndpointGroup>>>,
    pub(crate) endpoints: Arc<Mutex<HashMap<String, Vec<PortMapping>>>>,
    pub(crate) backend_services: Arc<Mutex<HashMap<String, BackendService>>>,
    pub(crate) forwarding_rules: Arc<Mutex<HashMap<String, ForwardingRule>>>,
    pub(crate) service_attachments: Arc<Mutex<HashMap<String, ServiceAttachment>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    failures: Arc<Mutex<HashMap<&'static str, u16>>>,
}

impl MockGcpClient {
    /// Create a new, empty mock client
    pub fn new(project: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            firewalls: Arc::new(Mutex::new(HashMap::new())),
            negs: Arc::new(Mutex::new(HashMap::new())),
            endpoints: Arc::new(Mutex::new(HashMap::new())),
            backend_services: Arc::new(Mutex::new(HashMap::new())),
            forwarding_rules: Arc::new(Mutex::new(HashMap::new())),
            service_attachments: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make every call to `method` fail with `status` until cleared.
    ///
    /// A 404 fails with `NotFound`, a 409 with `AlreadyExists`, anything else
    /// with `Api`.
    pub fn fail_on(&self, method: &'static str, status: u16) {
        self.failures.lock().unwrap().insert(method, status);
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change remote state, in order, as `method` names
    pub fn mutating_calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_mutating())
            .map(|c| c.method)
            .collect()
    }

    /// Forget recorded calls (stores are kept)
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Add a firewall to the mock store (for test setup)
    pub fn add_firewall(&self, firewall: Firewall) {
        self.firewalls
            .lock()
            .unwrap()
            .insert(firewall.name.clone(), firewall);
    }

    /// Add an endpoint group with the given endpoints (for test setup)
    pub fn add_neg(&self, name: &str, endpoints: Vec<PortMapping>) {
        self.negs.lock().unwrap().insert(
            name.to_string(),
            NetworkEndpointGroup {
                name: name.to_string(),
                network_endpoint_type: Some(PORTMAP_ENDPOINT_TYPE.to_string()),
                ..Default::default()
            },
        );
        self.endpoints
            .lock()
            .unwrap()
            .insert(name.to_string(), endpoints);
    }

    /// Current endpoints of an endpoint group
    pub fn endpoints_of(&self, neg: &str) -> Vec<PortMapping> {
        self.endpoints
            .lock()
            .unwrap()
            .get(neg)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_firewall_sync(&self, name: &str) -> Option<Firewall> {
        self.firewalls.lock().unwrap().get(name).cloned()
    }

    pub fn has_neg(&self, name: &str) -> bool {
        self.negs.lock().unwrap().contains_key(name)
    }

    pub fn has_backend_service(&self, name: &str) -> bool {
        self.backend_services.lock().unwrap().contains_key(name)
    }

    pub fn get_forwarding_rule_sync(&self, name: &str) -> Option<ForwardingRule> {
        self.forwarding_rules.lock().unwrap().get(name).cloned()
    }

    pub fn get_service_attachment_sync(&self, name: &str) -> Option<ServiceAttachment> {
        self.service_attachments.lock().unwrap().get(name).cloned()
    }

    /// Whether no resource of any type is left
    pub fn is_empty(&self) -> bool {
        self.firewalls.lock().unwrap().is_empty()
            && self.negs.lock().unwrap().is_empty()
            && self.backend_services.lock().unwrap().is_empty()
            && self.forwarding_rules.lock().unwrap().is_empty()
            && self.service_attachments.lock().unwrap().is_empty()
    }

    fn record(&self, method: &'static str, target: &str) -> Result<(), GcpError> {
        self.calls.lock().unwrap().push(MockCall {
            method,
            target: target.to_string(),
        });
        match self.failures.lock().unwrap().get(method) {
            None => Ok(()),
            Some(404) => Err(GcpError::NotFound(format!("{} {}", method, target))),
            Some(409) => Err(GcpError::AlreadyExists(format!("{} {}", method, target))),
            Some(status) => Err(GcpError::Api {
                status: *status,
                message: format!("injected failure in {} for {}", method, target),
            }),
        }
    }

    fn get_from<T: Clone>(
        store: &Mutex<HashMap<String, T>>,
        kind: &str,
        name: &str,
    ) -> Result<T, GcpError> {
        store
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GcpError::NotFound(format!("{} {}", kind, name)))
    }

    fn insert_into<T>(
        store: &Mutex<HashMap<String, T>>,
        kind: &str,
        name: &str,
        value: T,
    ) -> Result<(), GcpError> {
        let mut store = store.lock().unwrap();
        if store.contains_key(name) {
            return Err(GcpError::AlreadyExists(format!("{} {}", kind, name)));
        }
        store.insert(name.to_string(), value);
        Ok(())
    }

    fn remove_from<T>(
        store: &Mutex<HashMap<String, T>>,
        kind: &str,
        name: &str,
    ) -> Result<(), GcpError> {
        store
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GcpError::NotFound(format!("{} {}", kind, name)))
    }

    fn in_use(kind: &str, name: &str, by: &str) -> GcpError {
        GcpError::Api {
            status: 400,
            message: format!("{} {} is in use by {}", kind, name, by),
        }
    }

    fn firewall(name: &str, ports: &[i32]) -> Firewall {
        Firewall {
            name: name.to_string(),
            direction: Some("INGRESS".to_string()),
            priority: Some(1000),
            allowed: vec![FirewallAllowed {
                ip_protocol: Some("tcp".to_string()),
                ports: port_strings(ports),
            }],
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl GcpClientTrait for MockGcpClient {
    fn project(&self) -> &str {
        &self.project
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn get_firewall(&self, name: &str) -> Result<Firewall, GcpError> {
        self.record("get_firewall", name)?;
        Self::get_from(&self.firewalls, "firewall", name)
    }

    async fn create_firewall(&self, name: &str, ports: &[i32]) -> Result<(), GcpError> {
        self.record("create_firewall", name)?;
        Self::insert_into(&self.firewalls, "firewall", name, Self::firewall(name, ports))
    }

    async fn update_firewall(&self, name: &str, ports: &[i32]) -> Result<(), GcpError> {
        self.record("update_firewall", name)?;
        let mut firewalls = self.firewalls.lock().unwrap();
        let existing = firewalls
            .get_mut(name)
            .ok_or_else(|| GcpError::NotFound(format!("firewall {}", name)))?;
        existing.allowed = Self::firewall(name, ports).allowed;
        Ok(())
    }

    async fn delete_firewall(&self, name: &str) -> Result<(), GcpError> {
        self.record("delete_firewall", name)?;
        Self::remove_from(&self.firewalls, "firewall", name)
    }

    async fn get_neg(&self, name: &str) -> Result<NetworkEndpointGroup, GcpError> {
        self.record("get_neg", name)?;
        Self::get_from(&self.negs, "networkEndpointGroup", name)
    }

    async fn create_portmap_neg(&self, name: &str) -> Result<(), GcpError> {
        self.record("create_portmap_neg", name)?;
        let neg = NetworkEndpointGroup {
            name: name.to_string(),
            network_endpoint_type: Some(PORTMAP_ENDPOINT_TYPE.to_string()),
            ..Default::default()
        };
        Self::insert_into(&self.negs, "networkEndpointGroup", name, neg)?;
        self.endpoints
            .lock()
            .unwrap()
            .insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_neg(&self, name: &str) -> Result<(), GcpError> {
        self.record("delete_neg", name)?;
        let fqn = neg_fqn(&self.project, &self.region, name);
        if let Some(backend) = self
            .backend_services
            .lock()
            .unwrap()
            .values()
            .find(|b| b.backends.iter().any(|g| g.group == fqn))
        {
            return Err(Self::in_use("networkEndpointGroup", name, &backend.name));
        }
        Self::remove_from(&self.negs, "networkEndpointGroup", name)?;
        self.endpoints.lock().unwrap().remove(name);
        Ok(())
    }

    async fn list_endpoints(&self, neg: &str) -> Result<Vec<PortMapping>, GcpError> {
        self.record("list_endpoints", neg)?;
        self.endpoints
            .lock()
            .unwrap()
            .get(neg)
            .cloned()
            .ok_or_else(|| GcpError::NotFound(format!("networkEndpointGroup {}", neg)))
    }

    async fn attach_endpoints(&self, neg: &str, mappings: &[PortMapping]) -> Result<(), GcpError> {
        self.record("attach_endpoints", neg)?;
        let mut endpoints = self.endpoints.lock().unwrap();
        let attached = endpoints
            .get_mut(neg)
            .ok_or_else(|| GcpError::NotFound(format!("networkEndpointGroup {}", neg)))?;
        for mapping in mappings {
            if attached.contains(mapping) {
                continue;
            }
            if attached.iter().any(|m| m.port == mapping.port) {
                return Err(GcpError::Api {
                    status: 400,
                    message: format!("client destination port {} already in use", mapping.port),
                });
            }
            attached.push(mapping.clone());
        }
        Ok(())
    }

    async fn detach_endpoints(&self, neg: &str, mappings: &[PortMapping]) -> Result<(), GcpError> {
        self.record("detach_endpoints", neg)?;
        let mut endpoints = self.endpoints.lock().unwrap();
        let attached = endpoints
            .get_mut(neg)
            .ok_or_else(|| GcpError::NotFound(format!("networkEndpointGroup {}", neg)))?;
        attached.retain(|m| !mappings.contains(m));
        Ok(())
    }

    async fn get_backend_service(&self, name: &str) -> Result<BackendService, GcpError> {
        self.record("get_backend_service", name)?;
        Self::get_from(&self.backend_services, "backendService", name)
    }

    async fn create_backend_service(&self, name: &str, neg: &str) -> Result<(), GcpError> {
        self.record("create_backend_service", name)?;
        if !self.has_neg(neg) {
            return Err(GcpError::NotFound(format!("networkEndpointGroup {}", neg)));
        }
        let backend = BackendService {
            name: name.to_string(),
            protocol: Some("TCP".to_string()),
            load_balancing_scheme: Some("INTERNAL".to_string()),
            backends: vec![Backend {
                group: neg_fqn(&self.project, &self.region, neg),
                balancing_mode: Some("CONNECTION".to_string()),
            }],
            ..Default::default()
        };
        Self::insert_into(&self.backend_services, "backendService", name, backend)
    }

    async fn delete_backend_service(&self, name: &str) -> Result<(), GcpError> {
        self.record("delete_backend_service", name)?;
        let fqn = backend_service_fqn(&self.project, &self.region, name);
        if let Some(rule) = self
            .forwarding_rules
            .lock()
            .unwrap()
            .values()
            .find(|r| r.backend_service.as_deref() == Some(fqn.as_str()))
        {
            return Err(Self::in_use("backendService", name, &rule.name));
        }
        Self::remove_from(&self.backend_services, "backendService", name)
    }

    async fn get_forwarding_rule(&self, name: &str) -> Result<ForwardingRule, GcpError> {
        self.record("get_forwarding_rule", name)?;
        Self::get_from(&self.forwarding_rules, "forwardingRule", name)
    }

    async fn create_forwarding_rule(
        &self,
        name: &str,
        backend: &str,
        ip: Option<&str>,
        global_access: bool,
    ) -> Result<(), GcpError> {
        self.record("create_forwarding_rule", name)?;
        if !self.has_backend_service(backend) {
            return Err(GcpError::NotFound(format!("backendService {}", backend)));
        }
        let rule = ForwardingRule {
            name: name.to_string(),
            ip_address: ip.map(str::to_string),
            ip_protocol: Some("TCP".to_string()),
            allow_global_access: global_access.then_some(true),
            all_ports: Some(true),
            backend_service: Some(backend_service_fqn(&self.project, &self.region, backend)),
            load_balancing_scheme: Some("INTERNAL".to_string()),
            ..Default::default()
        };
        Self::insert_into(&self.forwarding_rules, "forwardingRule", name, rule)
    }

    async fn delete_forwarding_rule(&self, name: &str) -> Result<(), GcpError> {
        self.record("delete_forwarding_rule", name)?;
        let fqn = forwarding_rule_fqn(&self.project, &self.region, name);
        if let Some(attachment) = self
            .service_attachments
            .lock()
            .unwrap()
            .values()
            .find(|a| a.producer_forwarding_rule.as_deref() == Some(fqn.as_str()))
        {
            return Err(Self::in_use("forwardingRule", name, &attachment.name));
        }
        Self::remove_from(&self.forwarding_rules, "forwardingRule", name)
    }

    async fn get_service_attachment(&self, name: &str) -> Result<ServiceAttachment, GcpError> {
        self.record("get_service_attachment", name)?;
        Self::get_from(&self.service_attachments, "serviceAttachment", name)
    }

    async fn create_service_attachment(
        &self,
        name: &str,
        forwarding_rule_fqn: &str,
        consumers: &[ConsumerProjectLimit],
        nat_subnets: &[String],
    ) -> Result<(), GcpError> {
        self.record("create_service_attachment", name)?;
        let rule_name = forwarding_rule_fqn.rsplit('/').next().unwrap_or_default();
        if self.get_forwarding_rule_sync(rule_name).is_none() {
            return Err(GcpError::NotFound(format!("forwardingRule {}", forwarding_rule_fqn)));
        }
        let attachment = ServiceAttachment {
            name: name.to_string(),
            producer_forwarding_rule: Some(forwarding_rule_fqn.to_string()),
            connection_preference: Some("ACCEPT_MANUAL".to_string()),
            consumer_accept_lists: consumers.to_vec(),
            nat_subnets: nat_subnets.to_vec(),
            ..Default::default()
        };
        Self::insert_into(&self.service_attachments, "serviceAttachment", name, attachment)
    }

    async fn delete_service_attachment(&self, name: &str) -> Result<(), GcpError> {
        self.record("delete_service_attachment", name)?;
        Self::remove_from(&self.service_attachments, "serviceAttachment", name)
    }
}
