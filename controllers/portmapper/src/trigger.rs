//! Which StatefulSets the controller acts on.

use k8s_openapi::api::apps::v1::StatefulSet;

/// Annotation carrying the JSON payload
pub const ANNOTATION: &str = "0x5d.org/psc-portmapper";

/// Payload stored under [`ANNOTATION`], if any.
pub fn annotation_value(sts: &StatefulSet) -> Option<&str> {
    sts.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION))
        .map(String::as_str)
}

/// Whether the StatefulSet opted in to port mapping.
pub fn is_annotated(sts: &StatefulSet) -> bool {
    annotation_value(sts).is_some()
}
