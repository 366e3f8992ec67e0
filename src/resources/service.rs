//! Service generation for MongoDB replica sets
//!
//! Every replica set gets a headless service used for intra-cluster member
//! discovery. When exposure is enabled, each member additionally gets its own
//! service whose type follows the replica set's [`ExposureMode`].
//!
//! Generators are pure: they never talk to the API server, and the returned
//! services are applied by the reconciler.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{ExposureMode, MongoDBCluster, ReplsetSpec};
use crate::resources::common::{
    EXPOSE_LABEL, MONGOD_PORT_NAME, POD_NAME_LABEL, owner_reference, replset_labels,
    replset_selector,
};

/// Tells the AWS load balancer to forward and health-check over plain TCP
pub const LB_BACKEND_PROTOCOL_ANNOTATION: &str =
    "service.beta.kubernetes.io/aws-load-balancer-backend-protocol";

/// Keep the client source IP and never hop through another node
pub const EXTERNAL_TRAFFIC_POLICY_LOCAL: &str = "Local";

/// Cluster IP value that makes a service headless
pub const HEADLESS_CLUSTER_IP: &str = "None";

/// Name of the headless service for a replica set
pub fn replset_service_name(cluster_name: &str, replset: &str) -> String {
    format!("{}-{}", cluster_name, replset)
}

/// The single mongod port every service exposes
fn mongod_port(port: i32) -> ServicePort {
    ServicePort {
        name: Some(MONGOD_PORT_NAME.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Generate the headless service for a replica set
///
/// Selects all members of the replica set. It has no virtual IP: clients
/// resolve individual member addresses through DNS. It is generated for
/// every replica set regardless of its exposure mode.
pub fn generate_replset_service(cluster: &MongoDBCluster, replset: &ReplsetSpec) -> Service {
    let cluster_name = cluster.name_any();

    Service {
        metadata: ObjectMeta {
            name: Some(replset_service_name(&cluster_name, &replset.name)),
            namespace: cluster.namespace(),
            labels: Some(replset_labels(cluster, &replset.name)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(replset_selector(&cluster_name, &replset.name)),
            ports: Some(vec![mongod_port(cluster.spec.mongod.net.port)]),
            type_: Some("ClusterIP".to_string()),
            cluster_ip: Some(HEADLESS_CLUSTER_IP.to_string()),
            // Members must be discoverable before they pass readiness to form the replica set
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the service exposing a single replica set member
///
/// The service is named after the member pod and selects only that pod.
/// Its shape depends on the replica set's exposure mode:
/// - `NodePort`: node port with `externalTrafficPolicy: Local`
/// - `LoadBalancer`: provider load balancer with `externalTrafficPolicy: Local`
///   and a TCP backend-protocol annotation
/// - anything else: a ClusterIP service for the member
pub fn generate_external_service(
    cluster: &MongoDBCluster,
    replset: &ReplsetSpec,
    pod_name: &str,
) -> Service {
    let expose = &replset.expose;
    let mode = expose.expose_type;

    let mut labels = replset_labels(cluster, &replset.name);
    labels.insert(EXPOSE_LABEL.to_string(), "external".to_string());

    let mut annotations = BTreeMap::new();
    if mode == ExposureMode::LoadBalanced {
        annotations.insert(
            LB_BACKEND_PROTOCOL_ANNOTATION.to_string(),
            "tcp".to_string(),
        );
    }
    annotations.extend(expose.service_annotations.clone());

    let external_traffic_policy = match mode {
        ExposureMode::NodeLocal | ExposureMode::LoadBalanced => {
            Some(EXTERNAL_TRAFFIC_POLICY_LOCAL.to_string())
        }
        _ => None,
    };

    let load_balancer_source_ranges =
        if mode == ExposureMode::LoadBalanced && !expose.load_balancer_source_ranges.is_empty() {
            Some(expose.load_balancer_source_ranges.clone())
        } else {
            None
        };

    Service {
        metadata: ObjectMeta {
            name: Some(pod_name.to_string()),
            namespace: cluster.namespace(),
            labels: Some(labels),
            annotations: if annotations.is_empty() {
                None
            } else {
                Some(annotations)
            },
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                POD_NAME_LABEL.to_string(),
                pod_name.to_string(),
            )])),
            ports: Some(vec![mongod_port(cluster.spec.mongod.net.port)]),
            type_: Some(mode.service_type().to_string()),
            external_traffic_policy,
            load_balancer_source_ranges,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Exposure mode of a materialized service, derived from its type
pub fn service_exposure_mode(svc: &Service) -> ExposureMode {
    ExposureMode::from_service_type(svc.spec.as_ref().and_then(|s| s.type_.as_deref()))
}

/// Find the mongod port in a service's port table
pub fn find_mongod_port(svc: &Service) -> Option<&ServicePort> {
    svc.spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| {
            ports
                .iter()
                .find(|p| p.name.as_deref() == Some(MONGOD_PORT_NAME))
        })
}
