//! Unit tests for the StatefulSet reconciler

use super::exposure::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use super::*;
use crate::test_utils::*;
use gcp_client::{Firewall, FirewallAllowed, MockGcpClient};
use k8s_openapi::api::apps::v1::StatefulSet;

const NAMESPACE: &str = "apps";
const NAME: &str = "db";

/// Annotated StatefulSet with `replicas` pods, pod `i` on node `node-i`
fn cluster(replicas: u32) -> (MockGcpClient, InMemoryWorkloads, StatefulSet) {
    let gcp = MockGcpClient::new(TEST_PROJECT, TEST_REGION);
    let workloads = InMemoryWorkloads::new();
    let sts = create_test_stateful_set(NAMESPACE, NAME, Some(&test_annotation("db-")));
    workloads.add_stateful_set(sts.clone());
    for i in 0..replicas {
        let node = format!("node-{}", i);
        workloads.add_pod(create_test_pod(NAMESPACE, NAME, i, Some(&node)));
        workloads.add_node(create_test_node(&node));
    }
    (gcp, workloads, sts)
}

fn names() -> ResourceNames {
    ResourceNames::new("db-")
}

/// `(port, instance, instance_port)` of a registered endpoint
type Endpoint = (i32, String, i32);

fn mapping(port: i32, node: &str) -> Endpoint {
    (port, test_instance(node), 30000)
}

fn endpoints(gcp: &MockGcpClient) -> Vec<Endpoint> {
    let mut endpoints: Vec<_> = gcp
        .endpoints_of(&names().neg)
        .into_iter()
        .map(|m| (m.port, m.instance, m.instance_port))
        .collect();
    endpoints.sort();
    endpoints
}

#[test]
fn test_resource_names() {
    let names = ResourceNames::new("db-");
    assert_eq!(names.service, "db-psc-portmapper-nodeport");
    assert_eq!(names.firewall, "db-psc-portmapper-firewall");
    assert_eq!(names.neg, "db-psc-portmapper-neg");
    assert_eq!(names.backend, "db-psc-portmapper-backend");
    assert_eq!(names.forwarding_rule, "db-psc-portmapper-forwarding-rule");
    assert_eq!(names.service_attachment, "db-psc-portmapper-service-attachment");
}

#[tokio::test]
async fn test_first_pass_creates_chain_in_order() {
    let (gcp, workloads, sts) = cluster(3);
    let (reconciler, metrics) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(workloads.mutating_calls(), vec!["add_finalizer", "create_service"]);
    assert_eq!(
        gcp.mutating_calls(),
        vec![
            "create_firewall",
            "create_portmap_neg",
            "create_backend_service",
            "attach_endpoints",
            "create_forwarding_rule",
            "create_service_attachment",
        ]
    );
    assert_eq!(workloads.finalizers(NAMESPACE, NAME), vec![FINALIZER.to_string()]);

    let firewall = gcp.get_firewall_sync(&names().firewall).unwrap();
    assert_eq!(firewall.allowed[0].ports, vec!["30000".to_string()]);
    assert_eq!(
        endpoints(&gcp),
        vec![
            mapping(30000, "node-0"),
            mapping(30001, "node-1"),
            mapping(30002, "node-2"),
        ]
    );

    let attachment = gcp.get_service_attachment_sync(&names().service_attachment).unwrap();
    assert_eq!(
        attachment.producer_forwarding_rule.as_deref(),
        Some("projects/proj/regions/us-east1/forwardingRules/db-psc-portmapper-forwarding-rule")
    );
    assert!(attachment.consumer_accept_lists.is_empty());
    assert_eq!(metrics.passes("success"), 1);
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let (gcp, workloads, sts) = cluster(3);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();
    gcp.reset_calls();
    workloads.reset_calls();

    reconciler.reconcile(&sts).await.unwrap();

    assert!(gcp.mutating_calls().is_empty(), "{:?}", gcp.mutating_calls());
    assert!(workloads.mutating_calls().is_empty(), "{:?}", workloads.mutating_calls());
}

#[tokio::test]
async fn test_exposure_service_selects_replicas() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    let service = workloads.service(NAMESPACE, &names().service).unwrap();
    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("NodePort"));
    assert_eq!(
        spec.selector.unwrap().get("app").map(String::as_str),
        Some(NAME)
    );
    assert_eq!(spec.ports.unwrap()[0].node_port, Some(30000));
    assert_eq!(
        service.metadata.labels.unwrap().get(MANAGED_BY_LABEL).map(String::as_str),
        Some(MANAGED_BY_VALUE)
    );
}

#[tokio::test]
async fn test_exposure_service_drift_is_repaired() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    let mut drifted = workloads.service(NAMESPACE, &names().service).unwrap();
    drifted.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].node_port = Some(31000);
    workloads.add_service(NAMESPACE, drifted);
    workloads.reset_calls();

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(workloads.mutating_calls(), vec!["update_service"]);
    let repaired = workloads.service(NAMESPACE, &names().service).unwrap();
    assert_eq!(repaired.spec.unwrap().ports.unwrap()[0].node_port, Some(30000));
    assert_eq!(repaired.metadata.resource_version.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_unannotated_stateful_set_is_ignored() {
    let (gcp, workloads, _) = cluster(1);
    let plain = create_test_stateful_set(NAMESPACE, NAME, None);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&plain).await.unwrap();

    assert!(workloads.calls().is_empty());
    assert!(gcp.calls().is_empty());
}

#[tokio::test]
async fn test_vanished_stateful_set_is_a_no_op() {
    let gcp = MockGcpClient::new(TEST_PROJECT, TEST_REGION);
    let workloads = InMemoryWorkloads::new();
    let sts = create_test_stateful_set(NAMESPACE, NAME, Some(&test_annotation("db-")));
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(workloads.calls(), vec!["get_stateful_set"]);
    assert!(gcp.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_spec_fails_after_finalizer() {
    let gcp = MockGcpClient::new(TEST_PROJECT, TEST_REGION);
    let workloads = InMemoryWorkloads::new();
    let annotation = r#"{"consumer_accept_list": [{"network_fqn": "net"}], "nat_subnet_fqns": []}"#;
    let sts = create_test_stateful_set(NAMESPACE, NAME, Some(annotation));
    workloads.add_stateful_set(sts.clone());
    let (reconciler, metrics) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::Spec));
    let message = err.to_string();
    assert!(message.contains("consumer_list[0]"), "{}", message);
    assert!(message.contains("nat_subnet_fqns is empty"), "{}", message);
    assert_eq!(workloads.mutating_calls(), vec!["add_finalizer"]);
    assert!(gcp.calls().is_empty());
    assert_eq!(metrics.failures_for(ReconcileStep::Spec), 1);
    assert_eq!(metrics.passes("error"), 1);
}

#[tokio::test]
async fn test_undecodable_annotation_fails() {
    let gcp = MockGcpClient::new(TEST_PROJECT, TEST_REGION);
    let workloads = InMemoryWorkloads::new();
    let sts = create_test_stateful_set(NAMESPACE, NAME, Some("{not json"));
    workloads.add_stateful_set(sts.clone());
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();
    assert_eq!(err.step(), Some(ReconcileStep::Spec));
    assert!(err.to_string().contains("couldn't decode"), "{}", err);
}

#[tokio::test]
async fn test_finalizer_failure_stops_pass() {
    let (gcp, workloads, sts) = cluster(1);
    workloads.fail_on("add_finalizer");
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::Finalizer));
    assert!(workloads.service(NAMESPACE, &names().service).is_none());
    assert!(gcp.calls().is_empty());
}

#[tokio::test]
async fn test_create_failure_stops_later_steps() {
    for (method, step) in [
        ("create_firewall", ReconcileStep::Firewall),
        ("create_portmap_neg", ReconcileStep::EndpointGroup),
        ("create_backend_service", ReconcileStep::Backend),
        ("attach_endpoints", ReconcileStep::Endpoints),
        ("create_forwarding_rule", ReconcileStep::ForwardingRule),
        ("create_service_attachment", ReconcileStep::ServiceAttachment),
    ] {
        let (gcp, workloads, sts) = cluster(2);
        gcp.fail_on(method, 500);
        let (reconciler, metrics) = create_test_reconciler(&gcp, &workloads);

        let err = reconciler.reconcile(&sts).await.unwrap_err();

        assert_eq!(err.step(), Some(step), "{}", method);
        assert!(err.to_string().starts_with(step.as_str()), "{}", err);
        assert_eq!(gcp.mutating_calls().last(), Some(&method), "{}", method);
        assert_eq!(metrics.failures_for(step), 1);
    }
}

#[tokio::test]
async fn test_get_failure_is_not_treated_as_missing() {
    let (gcp, workloads, sts) = cluster(1);
    gcp.fail_on("get_backend_service", 503);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::Backend));
    assert_eq!(gcp.mutating_calls(), vec!["create_firewall", "create_portmap_neg"]);
}

#[tokio::test]
async fn test_concurrently_created_resource_counts_as_success() {
    let (gcp, workloads, sts) = cluster(1);
    gcp.fail_on("create_service_attachment", 409);
    let (reconciler, metrics) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();
    assert_eq!(metrics.passes("success"), 1);
}

#[tokio::test]
async fn test_missing_neg_on_list_is_reported_as_endpoints_failure() {
    let (gcp, workloads, sts) = cluster(1);
    gcp.fail_on("list_endpoints", 404);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::Endpoints));
    assert!(err.is_not_found());
    assert!(gcp.get_forwarding_rule_sync(&names().forwarding_rule).is_none());
}

#[tokio::test]
async fn test_stale_firewall_is_updated() {
    let (gcp, workloads, sts) = cluster(1);
    gcp.add_firewall(Firewall {
        name: names().firewall,
        allowed: vec![FirewallAllowed {
            ip_protocol: Some("tcp".to_string()),
            ports: vec!["30000".to_string(), "30005".to_string()],
        }],
        ..Default::default()
    });
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(gcp.mutating_calls()[0], "update_firewall");
    let firewall = gcp.get_firewall_sync(&names().firewall).unwrap();
    assert_eq!(firewall.allowed[0].ports, vec!["30000".to_string()]);
}

#[tokio::test]
async fn test_node_lookup_failure_fails_batch() {
    let (gcp, workloads, sts) = cluster(2);
    workloads.add_pod(create_test_pod(NAMESPACE, NAME, 2, Some("node-missing")));
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::ReplicaNodes));
    assert!(err.to_string().contains("node-missing"), "{}", err);
    assert!(gcp.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_provider_id_fails_batch() {
    let (gcp, workloads, sts) = cluster(1);
    workloads.add_node(create_test_node_with_provider_id("node-0", "aws:///us-east-1a/i-0123"));
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::ReplicaNodes));
    assert!(err.to_string().contains("node-0"), "{}", err);
    assert!(gcp.calls().is_empty());
}

#[tokio::test]
async fn test_node_lookups_respect_concurrency_of_one() {
    let (gcp, workloads, sts) = cluster(4);
    let settings = ReconcilerSettings {
        node_lookup_concurrency: 1,
        ..Default::default()
    };
    let (reconciler, _) = create_test_reconciler_with_settings(&gcp, &workloads, settings);

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(endpoints(&gcp).len(), 4);
    assert_eq!(
        workloads.calls().iter().filter(|c| *c == "get_node").count(),
        4
    );
}

#[tokio::test]
async fn test_unscheduled_replica_is_skipped() {
    let (gcp, workloads, sts) = cluster(0);
    workloads.add_pod(create_test_pod(NAMESPACE, NAME, 0, Some("node-0")));
    workloads.add_pod(create_test_pod(NAMESPACE, NAME, 1, None));
    workloads.add_pod(create_test_pod(NAMESPACE, NAME, 2, Some("node-2")));
    workloads.add_node(create_test_node("node-0"));
    workloads.add_node(create_test_node("node-2"));
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(
        endpoints(&gcp),
        vec![mapping(30000, "node-0"), mapping(30001, "node-2")]
    );
}

#[tokio::test]
async fn test_scale_down_detaches_obsolete_endpoints() {
    let (gcp, workloads, sts) = cluster(3);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    workloads.remove_pod("db-2");
    gcp.reset_calls();
    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(gcp.mutating_calls(), vec!["detach_endpoints"]);
    assert_eq!(
        endpoints(&gcp),
        vec![mapping(30000, "node-0"), mapping(30001, "node-1")]
    );
}

#[tokio::test]
async fn test_zero_replicas_still_builds_chain() {
    let (gcp, workloads, sts) = cluster(0);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert!(endpoints(&gcp).is_empty());
    assert!(!gcp.mutating_calls().contains(&"attach_endpoints"));
    assert!(gcp.get_service_attachment_sync(&names().service_attachment).is_some());
}

#[tokio::test]
async fn test_no_named_ports_exposes_nothing() {
    let gcp = MockGcpClient::new(TEST_PROJECT, TEST_REGION);
    let workloads = InMemoryWorkloads::new();
    let annotation = r#"{"prefix": "db-", "nat_subnet_fqns": ["projects/p/regions/r/subnetworks/nat"]}"#;
    let sts = create_test_stateful_set(NAMESPACE, NAME, Some(annotation));
    workloads.add_stateful_set(sts.clone());
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert!(gcp.calls().is_empty());
    assert!(workloads.service(NAMESPACE, &names().service).is_none());
}

fn deleting(workloads: &InMemoryWorkloads) -> StatefulSet {
    let current = workloads.stateful_set(NAMESPACE, NAME).unwrap();
    let sts = marked_for_deletion(current);
    workloads.add_stateful_set(sts.clone());
    sts
}

#[tokio::test]
async fn test_deletion_tears_down_in_reverse_order() {
    let (gcp, workloads, sts) = cluster(3);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();
    let sts = deleting(&workloads);
    gcp.reset_calls();
    workloads.reset_calls();

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(workloads.mutating_calls(), vec!["delete_service", "remove_finalizer"]);
    assert_eq!(
        gcp.mutating_calls(),
        vec![
            "delete_service_attachment",
            "delete_forwarding_rule",
            "delete_backend_service",
            "delete_neg",
            "delete_firewall",
        ]
    );
    assert!(gcp.is_empty());
    assert!(workloads.service(NAMESPACE, &names().service).is_none());
    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
}

#[tokio::test]
async fn test_deletion_tolerates_absent_resources() {
    let (gcp, workloads, _) = cluster(1);
    let current = workloads.stateful_set(NAMESPACE, NAME).unwrap();
    workloads.add_stateful_set(with_finalizer(current, FINALIZER));
    let sts = deleting(&workloads);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert_eq!(gcp.mutating_calls().len(), 5);
    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
}

#[tokio::test]
async fn test_deletion_failure_keeps_finalizer() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, metrics) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();
    let sts = deleting(&workloads);
    gcp.fail_on("delete_backend_service", 500);
    gcp.reset_calls();

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::Backend));
    assert_eq!(
        gcp.mutating_calls(),
        vec![
            "delete_service_attachment",
            "delete_forwarding_rule",
            "delete_backend_service",
        ]
    );
    assert!(gcp.has_neg(&names().neg));
    assert_eq!(workloads.finalizers(NAMESPACE, NAME), vec![FINALIZER.to_string()]);
    assert_eq!(metrics.failures_for(ReconcileStep::Backend), 1);

    // The retry picks up where the failed pass stopped.
    gcp.clear_failures();
    reconciler.reconcile(&sts).await.unwrap();
    assert!(gcp.is_empty());
    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
}

#[tokio::test]
async fn test_exposure_service_delete_failure_is_not_fatal() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();
    let sts = deleting(&workloads);
    workloads.fail_on("delete_service");

    reconciler.reconcile(&sts).await.unwrap();

    assert!(gcp.is_empty());
    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
}

#[tokio::test]
async fn test_deletion_without_finalizer_is_a_no_op() {
    let (gcp, workloads, _) = cluster(1);
    let sts = deleting(&workloads);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert!(gcp.calls().is_empty());
    assert!(workloads.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_external_ports_past_range_fail_before_chain() {
    let (gcp, workloads, _) = cluster(2);
    let sts = reannotate(
        &workloads,
        Some(
            r#"{
                "prefix": "db-",
                "nat_subnet_fqns": ["projects/proj/regions/us-east1/subnetworks/psc-nat"],
                "node_ports": {"app": {"node_port": 30000, "container_port": 8080, "starting_port": 65535}}
            }"#,
        ),
    );
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();

    assert_eq!(err.step(), Some(ReconcileStep::Spec));
    assert!(err.to_string().contains("65535-65536"), "{}", err);
    assert!(gcp.mutating_calls().is_empty());
}

/// Replace the stored StatefulSet's annotation payload, or drop it with `None`
fn reannotate(workloads: &InMemoryWorkloads, payload: Option<&str>) -> StatefulSet {
    let mut sts = workloads.stateful_set(NAMESPACE, NAME).unwrap();
    let annotations = sts.metadata.annotations.get_or_insert_with(Default::default);
    match payload {
        Some(value) => {
            annotations.insert(crate::trigger::ANNOTATION.to_string(), value.to_string());
        }
        None => {
            annotations.remove(crate::trigger::ANNOTATION);
        }
    }
    workloads.add_stateful_set(sts.clone());
    sts
}

#[tokio::test]
async fn test_deletion_with_payload_that_no_longer_validates() {
    let (gcp, workloads, sts) = cluster(2);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    reannotate(
        &workloads,
        Some(r#"{"prefix": "db-", "nat_subnet_fqns": [], "consumer_accept_list": [{}]}"#),
    );
    let sts = deleting(&workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert!(gcp.is_empty());
    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
}

#[tokio::test]
async fn test_deletion_with_undecodable_payload_keeps_finalizer() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    reannotate(&workloads, Some("{not json"));
    let sts = deleting(&workloads);

    let err = reconciler.reconcile(&sts).await.unwrap_err();
    assert_eq!(err.step(), Some(ReconcileStep::Spec));
    assert_eq!(workloads.finalizers(NAMESPACE, NAME), vec![FINALIZER.to_string()]);
}

#[tokio::test]
async fn test_removed_annotation_releases_finalizer() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    let plain = reannotate(&workloads, None);
    gcp.reset_calls();
    workloads.reset_calls();

    reconciler.reconcile(&plain).await.unwrap();

    assert_eq!(workloads.mutating_calls(), vec!["remove_finalizer"]);
    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
    // nothing is known about the resources any more, so they stay
    assert!(gcp.calls().is_empty());
    assert!(gcp.has_neg(&names().neg));

    // once released, the StatefulSet is ignored like any other
    workloads.reset_calls();
    let plain = workloads.stateful_set(NAMESPACE, NAME).unwrap();
    reconciler.reconcile(&plain).await.unwrap();
    assert!(workloads.calls().is_empty());
}

#[tokio::test]
async fn test_removed_annotation_then_deletion_is_not_blocked() {
    let (gcp, workloads, sts) = cluster(1);
    let (reconciler, _) = create_test_reconciler(&gcp, &workloads);
    reconciler.reconcile(&sts).await.unwrap();

    reannotate(&workloads, None);
    let sts = deleting(&workloads);

    reconciler.reconcile(&sts).await.unwrap();

    assert!(workloads.finalizers(NAMESPACE, NAME).is_empty());
}

#[test]
fn test_has_finalizer() {
    let sts = create_test_stateful_set(NAMESPACE, NAME, None);
    assert!(!has_finalizer(&sts));
    assert!(has_finalizer(&with_finalizer(sts, FINALIZER)));
}
