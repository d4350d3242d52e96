//! Helper functions for common reconciliation patterns
//!
//! Every Compute resource in the chain follows the same get, compare, then
//! create or update cycle. [`ManagedResource`] describes one resource's
//! desired state and [`ensure`] runs the cycle for it; [`delete_if_present`]
//! is the teardown counterpart.

use crate::spec::Consumer;
use gcp_client::{
    firewall_needs_update, BackendService, ConsumerProjectLimit, Firewall, ForwardingRule,
    GcpClientTrait, GcpError, NetworkEndpointGroup, ServiceAttachment,
};
use std::future::Future;
use tracing::{debug, info, warn};

/// What [`ensure`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Unchanged,
    Created,
    Updated,
}

/// Desired state of one Compute resource
#[async_trait::async_trait]
pub trait ManagedResource: Send + Sync {
    type Observed: Send;

    /// Resource kind used in log lines
    const KIND: &'static str;

    fn name(&self) -> &str;

    async fn get(&self, client: &dyn GcpClientTrait) -> Result<Self::Observed, GcpError>;

    async fn create(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError>;

    /// Whether an existing resource differs from the desired state
    fn needs_update(&self, _observed: &Self::Observed) -> bool {
        false
    }

    async fn update(&self, _client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        Ok(())
    }
}

/// Get the resource; create it when missing, update it when stale.
///
/// `AlreadyExists` on create means another actor created it first and counts
/// as success.
pub async fn ensure<R: ManagedResource>(
    resource: &R,
    client: &dyn GcpClientTrait,
) -> Result<EnsureOutcome, GcpError> {
    match resource.get(client).await {
        Ok(observed) => {
            if resource.needs_update(&observed) {
                info!("{} {} is out of date, updating", R::KIND, resource.name());
                resource.update(client).await?;
                Ok(EnsureOutcome::Updated)
            } else {
                debug!("{} {} already up-to-date", R::KIND, resource.name());
                Ok(EnsureOutcome::Unchanged)
            }
        }
        Err(e) if e.is_not_found() => {
            info!("{} {} not found, creating", R::KIND, resource.name());
            match resource.create(client).await {
                Ok(()) => Ok(EnsureOutcome::Created),
                Err(e) if e.is_already_exists() => {
                    warn!("{} {} was created concurrently", R::KIND, resource.name());
                    Ok(EnsureOutcome::Unchanged)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// `(created, updated)` counts over the outcomes of several [`ensure`] calls.
pub fn tally(outcomes: &[EnsureOutcome]) -> (usize, usize) {
    outcomes.iter().fold((0, 0), |(created, updated), outcome| match outcome {
        EnsureOutcome::Created => (created + 1, updated),
        EnsureOutcome::Updated => (created, updated + 1),
        EnsureOutcome::Unchanged => (created, updated),
    })
}

/// Run a delete call, treating NotFound as already deleted.
///
/// Returns whether something was actually deleted.
pub async fn delete_if_present<F>(kind: &str, name: &str, delete: F) -> Result<bool, GcpError>
where
    F: Future<Output = Result<(), GcpError>> + Send,
{
    match delete.await {
        Ok(()) => {
            info!("Deleted {} {}", kind, name);
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            info!("{} {} already gone", kind, name);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Ingress firewall for the node ports
#[derive(Debug, Clone)]
pub struct FirewallResource {
    pub name: String,
    pub ports: Vec<i32>,
}

#[async_trait::async_trait]
impl ManagedResource for FirewallResource {
    type Observed = Firewall;
    const KIND: &'static str = "firewall";

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, client: &dyn GcpClientTrait) -> Result<Firewall, GcpError> {
        client.get_firewall(&self.name).await
    }

    async fn create(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        client.create_firewall(&self.name, &self.ports).await
    }

    fn needs_update(&self, observed: &Firewall) -> bool {
        firewall_needs_update(observed, &self.ports)
    }

    async fn update(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        client.update_firewall(&self.name, &self.ports).await
    }
}

/// Port-mapping network endpoint group
#[derive(Debug, Clone)]
pub struct EndpointGroupResource {
    pub name: String,
}

#[async_trait::async_trait]
impl ManagedResource for EndpointGroupResource {
    type Observed = NetworkEndpointGroup;
    const KIND: &'static str = "endpoint group";

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, client: &dyn GcpClientTrait) -> Result<NetworkEndpointGroup, GcpError> {
        client.get_neg(&self.name).await
    }

    async fn create(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        client.create_portmap_neg(&self.name).await
    }
}

/// Backend service in front of the endpoint group
#[derive(Debug, Clone)]
pub struct BackendResource {
    pub name: String,
    pub neg: String,
}

#[async_trait::async_trait]
impl ManagedResource for BackendResource {
    type Observed = BackendService;
    const KIND: &'static str = "backend service";

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, client: &dyn GcpClientTrait) -> Result<BackendService, GcpError> {
        client.get_backend_service(&self.name).await
    }

    async fn create(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        client.create_backend_service(&self.name, &self.neg).await
    }
}

/// Internal forwarding rule targeting the backend service
#[derive(Debug, Clone)]
pub struct ForwardingRuleResource {
    pub name: String,
    pub backend: String,
    pub ip: Option<String>,
    pub global_access: bool,
}

#[async_trait::async_trait]
impl ManagedResource for ForwardingRuleResource {
    type Observed = ForwardingRule;
    const KIND: &'static str = "forwarding rule";

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, client: &dyn GcpClientTrait) -> Result<ForwardingRule, GcpError> {
        client.get_forwarding_rule(&self.name).await
    }

    async fn create(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        client
            .create_forwarding_rule(
                &self.name,
                &self.backend,
                self.ip.as_deref(),
                self.global_access,
            )
            .await
    }
}

/// Service attachment publishing the forwarding rule
#[derive(Debug, Clone)]
pub struct ServiceAttachmentResource {
    pub name: String,
    pub forwarding_rule_fqn: String,
    pub consumers: Vec<ConsumerProjectLimit>,
    pub nat_subnets: Vec<String>,
}

impl ServiceAttachmentResource {
    /// Accept-list entries for the payload's consumers
    pub fn consumer_limits(consumers: &[Consumer]) -> Vec<ConsumerProjectLimit> {
        consumers
            .iter()
            .map(|c| ConsumerProjectLimit {
                project_id_or_num: c.project().map(str::to_string),
                network_url: c.network().map(str::to_string),
                connection_limit: c.connection_limit,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ManagedResource for ServiceAttachmentResource {
    type Observed = ServiceAttachment;
    const KIND: &'static str = "service attachment";

    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, client: &dyn GcpClientTrait) -> Result<ServiceAttachment, GcpError> {
        client.get_service_attachment(&self.name).await
    }

    async fn create(&self, client: &dyn GcpClientTrait) -> Result<(), GcpError> {
        client
            .create_service_attachment(
                &self.name,
                &self.forwarding_rule_fqn,
                &self.consumers,
                &self.nat_subnets,
            )
            .await
    }
}

#[cfg(test)]
#[path = "reconcile_helpers_test.rs"]
mod tests;
