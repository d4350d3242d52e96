//! Deletion path: the chain in reverse, then the finalizer.

use super::{has_finalizer, Reconciler, ResourceNames, FINALIZER};
use crate::error::{at, ControllerError, ReconcileStep};
use crate::reconcile_helpers::delete_if_present;
use crate::spec::decode_spec;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

impl Reconciler {
    pub(super) async fn teardown(
        &self,
        sts: &StatefulSet,
        namespace: &str,
        name: &str,
        raw: &str,
    ) -> Result<Action, ControllerError> {
        if !has_finalizer(sts) {
            debug!(
                "StatefulSet {}/{} is being deleted but carries no finalizer, nothing to clean up",
                namespace, name
            );
            return Ok(Action::await_change());
        }
        info!("Tearing down resources of StatefulSet {}/{}", namespace, name);

        let spec = decode_spec(raw).map_err(at(ReconcileStep::Spec))?;
        let names = ResourceNames::new(&spec.prefix);

        // Garbage collection removes it with the StatefulSet anyway.
        if let Err(e) = self.workloads.delete_service(namespace, &names.service).await {
            warn!(
                "Failed to delete exposure service {}/{}: {}",
                namespace, names.service, e
            );
        }

        let gcp = self.gcp.as_ref();
        delete_if_present(
            "Service attachment",
            &names.service_attachment,
            gcp.delete_service_attachment(&names.service_attachment),
        )
        .await
        .map_err(at(ReconcileStep::ServiceAttachment))?;
        delete_if_present(
            "Forwarding rule",
            &names.forwarding_rule,
            gcp.delete_forwarding_rule(&names.forwarding_rule),
        )
        .await
        .map_err(at(ReconcileStep::ForwardingRule))?;
        delete_if_present(
            "Backend service",
            &names.backend,
            gcp.delete_backend_service(&names.backend),
        )
        .await
        .map_err(at(ReconcileStep::Backend))?;
        delete_if_present("NEG", &names.neg, gcp.delete_neg(&names.neg))
            .await
            .map_err(at(ReconcileStep::EndpointGroup))?;
        delete_if_present("Firewall", &names.firewall, gcp.delete_firewall(&names.firewall))
            .await
            .map_err(at(ReconcileStep::Firewall))?;

        self.workloads
            .remove_finalizer(namespace, name, FINALIZER)
            .await
            .map_err(at(ReconcileStep::Finalizer))?;
        info!("Released StatefulSet {}/{}", namespace, name);
        Ok(Action::await_change())
    }

    /// Drop the finalizer of a StatefulSet whose annotation was removed.
    ///
    /// Without the annotation the resource names are unknown, so whatever was
    /// created for it stays behind and has to be removed by hand.
    pub(super) async fn release_unmanaged(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Action, ControllerError> {
        warn!(
            "StatefulSet {}/{} lost its annotation, releasing it; its Compute resources are no longer managed",
            namespace, name
        );
        self.workloads
            .remove_finalizer(namespace, name, FINALIZER)
            .await
            .map_err(at(ReconcileStep::Finalizer))?;
        Ok(Action::await_change())
    }
}
