//! Compute resource chain, created front to back.

use super::{Reconciler, ResourceNames};
use crate::error::{at, ControllerError, ReconcileStep};
use crate::portmap;
use crate::reconcile_helpers::{
    ensure, tally, BackendResource, EndpointGroupResource, FirewallResource, ForwardingRuleResource,
    ServiceAttachmentResource,
};
use crate::spec::Spec;
use gcp_client::{forwarding_rule_fqn, GcpError, PortMapping};
use tracing::{debug, error, info};

impl Reconciler {
    pub(super) async fn reconcile_chain(
        &self,
        names: &ResourceNames,
        spec: &Spec,
        mappings: &[PortMapping],
    ) -> Result<(), ControllerError> {
        let gcp = self.gcp.as_ref();
        let mut outcomes = Vec::with_capacity(5);

        let firewall = FirewallResource {
            name: names.firewall.clone(),
            ports: spec.node_ports(),
        };
        outcomes.push(ensure(&firewall, gcp).await.map_err(at(ReconcileStep::Firewall))?);

        let neg = EndpointGroupResource {
            name: names.neg.clone(),
        };
        outcomes.push(ensure(&neg, gcp).await.map_err(at(ReconcileStep::EndpointGroup))?);

        let backend = BackendResource {
            name: names.backend.clone(),
            neg: names.neg.clone(),
        };
        outcomes.push(ensure(&backend, gcp).await.map_err(at(ReconcileStep::Backend))?);

        self.reconcile_endpoints(&names.neg, mappings)
            .await
            .map_err(at(ReconcileStep::Endpoints))?;

        let forwarding_rule = ForwardingRuleResource {
            name: names.forwarding_rule.clone(),
            backend: names.backend.clone(),
            ip: spec.ip.clone(),
            global_access: spec.global_access.unwrap_or(false),
        };
        outcomes.push(
            ensure(&forwarding_rule, gcp)
                .await
                .map_err(at(ReconcileStep::ForwardingRule))?,
        );

        let service_attachment = ServiceAttachmentResource {
            name: names.service_attachment.clone(),
            forwarding_rule_fqn: forwarding_rule_fqn(gcp.project(), gcp.region(), &names.forwarding_rule),
            consumers: ServiceAttachmentResource::consumer_limits(&spec.consumer_accept_list),
            nat_subnets: spec.nat_subnet_fqns.clone(),
        };
        outcomes.push(
            ensure(&service_attachment, gcp)
                .await
                .map_err(at(ReconcileStep::ServiceAttachment))?,
        );

        let (created, updated) = tally(&outcomes);
        if created + updated == 0 {
            debug!("Resource chain of {} already up-to-date", names.service_attachment);
        } else {
            info!(
                "Resource chain of {}: {} created, {} updated",
                names.service_attachment, created, updated
            );
        }
        Ok(())
    }

    /// Make the NEG's endpoint set equal `desired`: detach the obsolete, then attach the missing.
    async fn reconcile_endpoints(&self, neg: &str, desired: &[PortMapping]) -> Result<(), GcpError> {
        let actual = self.gcp.list_endpoints(neg).await.map_err(|e| {
            if e.is_not_found() {
                error!(
                    "NEG {} disappeared before its endpoints could be listed, was it deleted by hand or by another process?",
                    neg
                );
            } else {
                error!("Failed to list endpoints of NEG {}: {}", neg, e);
            }
            e
        })?;

        let obsolete = portmap::obsolete(desired, &actual);
        if !obsolete.is_empty() {
            info!("Detaching {} obsolete endpoint(s) from NEG {}", obsolete.len(), neg);
            self.gcp.detach_endpoints(neg, &obsolete).await?;
        }

        let missing = portmap::missing(desired, &actual);
        if missing.is_empty() {
            debug!("NEG {} endpoints already up-to-date", neg);
        } else {
            info!("Attaching {} endpoint(s) to NEG {}", missing.len(), neg);
            self.gcp.attach_endpoints(neg, &missing).await?;
        }
        Ok(())
    }
}
