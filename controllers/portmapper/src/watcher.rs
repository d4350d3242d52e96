//! Kubernetes resource watchers.
//!
//! StatefulSets are the primary resource. Pods are watched through their
//! owner reference so that rescheduling or scaling a replica triggers a pass
//! for the owning StatefulSet.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Debounce applied to bursts of events for the same StatefulSet
const DEBOUNCE: Duration = Duration::from_secs(2);

/// Maximum StatefulSets reconciled at the same time
const CONCURRENCY: u16 = 4;

/// Watch StatefulSets (and their pods) until the stream ends.
pub async fn watch_stateful_sets(
    stateful_set_api: Api<StatefulSet>,
    pod_api: Api<Pod>,
    reconciler: Arc<Reconciler>,
) -> Result<(), ControllerError> {
    info!("Starting StatefulSet watcher");

    // Failed passes are retried after a fixed delay, no backoff.
    let error_policy = |sts: Arc<StatefulSet>, error: &ControllerError, ctx: Arc<Reconciler>| {
        error!(
            "Reconciliation error for StatefulSet {}/{}: {}",
            sts.metadata.namespace.as_deref().unwrap_or_default(),
            sts.metadata.name.as_deref().unwrap_or_default(),
            error
        );
        Action::requeue(ctx.requeue_delay())
    };

    let reconcile = |sts: Arc<StatefulSet>, ctx: Arc<Reconciler>| async move {
        debug!(
            "Reconciling StatefulSet {}/{}",
            sts.metadata.namespace.as_deref().unwrap_or_default(),
            sts.metadata.name.as_deref().unwrap_or_default()
        );
        ctx.reconcile(&sts).await
    };

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(CONCURRENCY);

    Controller::new(stateful_set_api, watcher::Config::default())
        .owns(pod_api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => debug!("Reconciled {}", object),
                Err(e) => error!("Controller error for StatefulSet: {}", e),
            }
        })
        .await;

    Ok(())
}
