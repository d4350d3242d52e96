//! Compute Engine API client
//!
//! REST implementation of [`GcpClientTrait`] over Compute Engine v1. Every
//! mutating call carries a fresh `requestId` and blocks until the returned
//! operation is DONE.

use crate::auth::TokenSource;
use crate::common::HttpClient;
use crate::config::{relative_resource_name, ClientConfig};
use crate::error::GcpError;
use crate::gcp_trait::GcpClientTrait;
use crate::models::*;
use crate::util::{backend_service_fqn, neg_fqn, port_strings};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Compute Engine API client
#[derive(Debug)]
pub struct GcpClient {
    http: HttpClient,
    config: ClientConfig,
}

impl GcpClient {
    /// Create a new client scoped to `config`
    pub fn new(config: ClientConfig, tokens: TokenSource) -> Result<Self, GcpError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let http = HttpClient::new(client, config.api_endpoint.clone(), tokens);
        Ok(Self { http, config })
    }

    /// Create a client that authenticates through the GCE metadata server
    pub fn with_metadata_auth(config: ClientConfig) -> Result<Self, GcpError> {
        let metadata = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Self::new(config, TokenSource::metadata(metadata))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn global_path(&self, collection: &str) -> String {
        format!("projects/{}/global/{}", self.config.project, collection)
    }

    fn regional_path(&self, collection: &str) -> String {
        format!(
            "projects/{}/regions/{}/{}",
            self.config.project, self.config.region, collection
        )
    }

    fn request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// POST to a collection or custom method and wait for the operation.
    async fn post_operation(&self, path: &str, body: serde_json::Value) -> Result<(), GcpError> {
        let path = format!("{}?requestId={}", path, Self::request_id());
        let operation: Operation = self.http.post(&path, &body).await?;
        self.http.wait_for_operation(operation).await
    }

    async fn remove(&self, resource_path: &str) -> Result<(), GcpError> {
        let path = format!("{}?requestId={}", resource_path, Self::request_id());
        let operation: Operation = self.http.delete(&path).await?;
        self.http.wait_for_operation(operation).await
    }

    fn endpoint_payload(mappings: &[PortMapping]) -> serde_json::Value {
        let endpoints: Vec<NetworkEndpoint> = mappings
            .iter()
            .map(|m| NetworkEndpoint {
                instance: Some(m.instance.clone()),
                port: Some(m.instance_port),
                client_destination_port: Some(m.port),
                ..Default::default()
            })
            .collect();
        json!({ "networkEndpoints": endpoints })
    }
}

#[async_trait::async_trait]
impl GcpClientTrait for GcpClient {
    fn project(&self) -> &str {
        &self.config.project
    }

    fn region(&self) -> &str {
        &self.config.region
    }

    async fn get_firewall(&self, name: &str) -> Result<Firewall, GcpError> {
        self.http
            .get(&format!("{}/{}", self.global_path("firewalls"), name))
            .await
    }

    async fn create_firewall(&self, name: &str, ports: &[i32]) -> Result<(), GcpError> {
        info!("Creating firewall {} for ports {:?}", name, ports);
        let firewall = Firewall {
            name: name.to_string(),
            description: Some("Managed by psc-portmapper".to_string()),
            network: Some(self.config.network.clone()),
            direction: Some("INGRESS".to_string()),
            priority: Some(1000),
            allowed: vec![FirewallAllowed {
                ip_protocol: Some("tcp".to_string()),
                ports: port_strings(ports),
            }],
            ..Default::default()
        };
        self.post_operation(&self.global_path("firewalls"), serde_json::to_value(&firewall)?)
            .await
    }

    async fn update_firewall(&self, name: &str, ports: &[i32]) -> Result<(), GcpError> {
        info!("Updating firewall {} to ports {:?}", name, ports);
        let patch = json!({
            "allowed": [FirewallAllowed {
                ip_protocol: Some("tcp".to_string()),
                ports: port_strings(ports),
            }]
        });
        let path = format!(
            "{}/{}?requestId={}",
            self.global_path("firewalls"),
            name,
            Self::request_id()
        );
        let operation: Operation = self.http.patch(&path, &patch).await?;
        self.http.wait_for_operation(operation).await
    }

    async fn delete_firewall(&self, name: &str) -> Result<(), GcpError> {
        info!("Deleting firewall {}", name);
        self.remove(&format!("{}/{}", self.global_path("firewalls"), name))
            .await
    }

    async fn get_neg(&self, name: &str) -> Result<NetworkEndpointGroup, GcpError> {
        self.http
            .get(&format!(
                "{}/{}",
                self.regional_path("networkEndpointGroups"),
                name
            ))
            .await
    }

    async fn create_portmap_neg(&self, name: &str) -> Result<(), GcpError> {
        info!("Creating port-mapping endpoint group {}", name);
        let neg = NetworkEndpointGroup {
            name: name.to_string(),
            network_endpoint_type: Some(PORTMAP_ENDPOINT_TYPE.to_string()),
            network: Some(self.config.network.clone()),
            subnetwork: Some(self.config.subnet.clone()),
            annotations: self.config.annotations.clone(),
            ..Default::default()
        };
        self.post_operation(
            &self.regional_path("networkEndpointGroups"),
            serde_json::to_value(&neg)?,
        )
        .await
    }

    async fn delete_neg(&self, name: &str) -> Result<(), GcpError> {
        info!("Deleting endpoint group {}", name);
        self.remove(&format!(
            "{}/{}",
            self.regional_path("networkEndpointGroups"),
            name
        ))
        .await
    }

    async fn list_endpoints(&self, neg: &str) -> Result<Vec<PortMapping>, GcpError> {
        let base = format!(
            "{}/{}/listNetworkEndpoints",
            self.regional_path("networkEndpointGroups"),
            neg
        );
        let mut mappings = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let path = match &page_token {
                Some(token) => format!("{}?pageToken={}", base, urlencoding::encode(token)),
                None => base.clone(),
            };
            let page: NetworkEndpointsPage = self.http.post(&path, &json!({})).await?;
            for item in page.items {
                let endpoint = item.network_endpoint;
                let (Some(instance), Some(instance_port), Some(port)) = (
                    endpoint.instance,
                    endpoint.port,
                    endpoint.client_destination_port,
                ) else {
                    debug!("Skipping endpoint without port mapping on {}", neg);
                    continue;
                };
                mappings.push(PortMapping {
                    port,
                    instance: relative_resource_name(&instance).to_string(),
                    instance_port,
                });
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(mappings)
    }

    async fn attach_endpoints(&self, neg: &str, mappings: &[PortMapping]) -> Result<(), GcpError> {
        info!("Attaching {} endpoints to {}", mappings.len(), neg);
        self.post_operation(
            &format!(
                "{}/{}/attachNetworkEndpoints",
                self.regional_path("networkEndpointGroups"),
                neg
            ),
            Self::endpoint_payload(mappings),
        )
        .await
    }

    async fn detach_endpoints(&self, neg: &str, mappings: &[PortMapping]) -> Result<(), GcpError> {
        info!("Detaching {} endpoints from {}", mappings.len(), neg);
        self.post_operation(
            &format!(
                "{}/{}/detachNetworkEndpoints",
                self.regional_path("networkEndpointGroups"),
                neg
            ),
            Self::endpoint_payload(mappings),
        )
        .await
    }

    async fn get_backend_service(&self, name: &str) -> Result<BackendService, GcpError> {
        self.http
            .get(&format!("{}/{}", self.regional_path("backendServices"), name))
            .await
    }

    async fn create_backend_service(&self, name: &str, neg: &str) -> Result<(), GcpError> {
        info!("Creating backend service {} for {}", name, neg);
        let backend = BackendService {
            name: name.to_string(),
            network: Some(self.config.network.clone()),
            protocol: Some("TCP".to_string()),
            load_balancing_scheme: Some("INTERNAL".to_string()),
            backends: vec![Backend {
                group: neg_fqn(&self.config.project, &self.config.region, neg),
                balancing_mode: Some("CONNECTION".to_string()),
            }],
            ..Default::default()
        };
        self.post_operation(
            &self.regional_path("backendServices"),
            serde_json::to_value(&backend)?,
        )
        .await
    }

    async fn delete_backend_service(&self, name: &str) -> Result<(), GcpError> {
        info!("Deleting backend service {}", name);
        self.remove(&format!("{}/{}", self.regional_path("backendServices"), name))
            .await
    }

    async fn get_forwarding_rule(&self, name: &str) -> Result<ForwardingRule, GcpError> {
        self.http
            .get(&format!("{}/{}", self.regional_path("forwardingRules"), name))
            .await
    }

    async fn create_forwarding_rule(
        &self,
        name: &str,
        backend: &str,
        ip: Option<&str>,
        global_access: bool,
    ) -> Result<(), GcpError> {
        info!("Creating forwarding rule {} for {}", name, backend);
        let rule = ForwardingRule {
            name: name.to_string(),
            ip_address: ip.map(str::to_string),
            ip_protocol: Some("TCP".to_string()),
            allow_global_access: global_access.then_some(true),
            all_ports: Some(true),
            backend_service: Some(backend_service_fqn(
                &self.config.project,
                &self.config.region,
                backend,
            )),
            network: Some(self.config.network.clone()),
            subnetwork: Some(self.config.subnet.clone()),
            load_balancing_scheme: Some("INTERNAL".to_string()),
            ..Default::default()
        };
        self.post_operation(
            &self.regional_path("forwardingRules"),
            serde_json::to_value(&rule)?,
        )
        .await
    }

    async fn delete_forwarding_rule(&self, name: &str) -> Result<(), GcpError> {
        info!("Deleting forwarding rule {}", name);
        self.remove(&format!("{}/{}", self.regional_path("forwardingRules"), name))
            .await
    }

    async fn get_service_attachment(&self, name: &str) -> Result<ServiceAttachment, GcpError> {
        self.http
            .get(&format!(
                "{}/{}",
                self.regional_path("serviceAttachments"),
                name
            ))
            .await
    }

    async fn create_service_attachment(
        &self,
        name: &str,
        forwarding_rule_fqn: &str,
        consumers: &[ConsumerProjectLimit],
        nat_subnets: &[String],
    ) -> Result<(), GcpError> {
        info!(
            "Creating service attachment {} for {} ({} consumers)",
            name,
            forwarding_rule_fqn,
            consumers.len()
        );
        let attachment = ServiceAttachment {
            name: name.to_string(),
            producer_forwarding_rule: Some(forwarding_rule_fqn.to_string()),
            connection_preference: Some("ACCEPT_MANUAL".to_string()),
            consumer_accept_lists: consumers.to_vec(),
            nat_subnets: nat_subnets.to_vec(),
            enable_proxy_protocol: Some(false),
            ..Default::default()
        };
        self.post_operation(
            &self.regional_path("serviceAttachments"),
            serde_json::to_value(&attachment)?,
        )
        .await
    }

    async fn delete_service_attachment(&self, name: &str) -> Result<(), GcpError> {
        info!("Deleting service attachment {}", name);
        self.remove(&format!(
            "{}/{}",
            self.regional_path("serviceAttachments"),
            name
        ))
        .await
    }
}
