//! GcpClient trait for mocking
//!
//! This trait abstracts the Compute API client so the reconciler can be driven
//! against an in-memory implementation in unit tests. Every method returns
//! `GcpError::NotFound` when the addressed resource does not exist.

use crate::error::GcpError;
use crate::models::*;

/// Trait for Compute Engine API operations used by the port mapper
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait GcpClientTrait: Send + Sync {
    /// Project every call is scoped to
    fn project(&self) -> &str;

    /// Region every regional call is scoped to
    fn region(&self) -> &str;

    // Firewall
    async fn get_firewall(&self, name: &str) -> Result<Firewall, GcpError>;
    async fn create_firewall(&self, name: &str, ports: &[i32]) -> Result<(), GcpError>;
    async fn update_firewall(&self, name: &str, ports: &[i32]) -> Result<(), GcpError>;
    async fn delete_firewall(&self, name: &str) -> Result<(), GcpError>;

    // Network endpoint group
    async fn get_neg(&self, name: &str) -> Result<NetworkEndpointGroup, GcpError>;
    async fn create_portmap_neg(&self, name: &str) -> Result<(), GcpError>;
    async fn delete_neg(&self, name: &str) -> Result<(), GcpError>;
    async fn list_endpoints(&self, neg: &str) -> Result<Vec<PortMapping>, GcpError>;
    async fn attach_endpoints(&self, neg: &str, mappings: &[PortMapping]) -> Result<(), GcpError>;
    async fn detach_endpoints(&self, neg: &str, mappings: &[PortMapping]) -> Result<(), GcpError>;

    // Backend service
    async fn get_backend_service(&self, name: &str) -> Result<BackendService, GcpError>;
    async fn create_backend_service(&self, name: &str, neg: &str) -> Result<(), GcpError>;
    async fn delete_backend_service(&self, name: &str) -> Result<(), GcpError>;

    // Forwarding rule
    async fn get_forwarding_rule(&self, name: &str) -> Result<ForwardingRule, GcpError>;
    async fn create_forwarding_rule(
        &self,
        name: &str,
        backend: &str,
        ip: Option<&str>,
        global_access: bool,
    ) -> Result<(), GcpError>;
    async fn delete_forwarding_rule(&self, name: &str) -> Result<(), GcpError>;

    // Service attachment
    async fn get_service_attachment(&self, name: &str) -> Result<ServiceAttachment, GcpError>;
    async fn create_service_attachment(
        &self,
        name: &str,
        forwarding_rule_fqn: &str,
        consumers: &[ConsumerProjectLimit],
        nat_subnets: &[String],
    ) -> Result<(), GcpError>;
    async fn delete_service_attachment(&self, name: &str) -> Result<(), GcpError>;
}
