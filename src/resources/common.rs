//! Common utilities for Kubernetes resource generation
//!
//! Shared label, annotation and ownership helpers used by every
//! resource generator so that selectors stay consistent.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::MongoDBCluster;

/// API version for MongoDBCluster CRD
pub const API_VERSION: &str = "mongodb-operator.smoketurner.com/v1alpha1";

/// Kind for MongoDBCluster CRD
pub const KIND: &str = "MongoDBCluster";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "mongodb-operator";

/// Label carrying the owning cluster name
pub const CLUSTER_LABEL: &str = "mongodb-operator.smoketurner.com/cluster";

/// Label carrying the replica set name
pub const REPLSET_LABEL: &str = "mongodb-operator.smoketurner.com/replset";

/// Label marking per-member services
pub const EXPOSE_LABEL: &str = "mongodb-operator.smoketurner.com/expose";

/// Label the StatefulSet controller sets on every pod
pub const POD_NAME_LABEL: &str = "statefulset.kubernetes.io/pod-name";

/// Name of the mongod port on every generated service
pub const MONGOD_PORT_NAME: &str = "mongodb";

/// Generate an owner reference for a MongoDBCluster
///
/// Child services are garbage collected when the cluster is deleted.
pub fn owner_reference(cluster: &MongoDBCluster) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for all resources belonging to a MongoDBCluster
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            cluster_name.to_string(),
        ),
        (
            "app.kubernetes.io/component".to_string(),
            "mongod".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (CLUSTER_LABEL.to_string(), cluster_name.to_string()),
    ])
}

/// Labels for a replica set's resources, including user-defined labels.
///
/// User labels cannot override the cluster or replset identifiers since
/// selectors depend on them.
pub fn replset_labels(cluster: &MongoDBCluster, replset: &str) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&cluster.name_any());

    for (key, value) in &cluster.spec.labels {
        if key != CLUSTER_LABEL && key != REPLSET_LABEL {
            labels.insert(key.clone(), value.clone());
        }
    }

    labels.insert(REPLSET_LABEL.to_string(), replset.to_string());
    labels
}

/// Selector matching every member of a replica set
pub fn replset_selector(cluster_name: &str, replset: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            cluster_name.to_string(),
        ),
        (CLUSTER_LABEL.to_string(), cluster_name.to_string()),
        (REPLSET_LABEL.to_string(), replset.to_string()),
    ])
}

/// Pod name of a replica set member
pub fn member_name(cluster_name: &str, replset: &str, ordinal: i32) -> String {
    format!("{}-{}-{}", cluster_name, replset, ordinal)
}
