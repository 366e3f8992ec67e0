//! Unit tests for service generators

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use mongodb_operator::crd::{ExposureMode, MongoDBCluster};
use mongodb_operator::resources::common::{
    CLUSTER_LABEL, EXPOSE_LABEL, POD_NAME_LABEL, REPLSET_LABEL, member_name,
};
use mongodb_operator::resources::service::{
    self, EXTERNAL_TRAFFIC_POLICY_LOCAL, HEADLESS_CLUSTER_IP, LB_BACKEND_PROTOCOL_ANNOTATION,
    find_mongod_port, service_exposure_mode,
};
use mongodb_operator::controller::{desired_service_names, exposed_members, stale_services};

use crate::common::*;

mod replset_service_tests {
    use super::*;

    #[test]
    fn test_replset_service_is_headless() {
        let cluster = create_test_cluster("db1", "default", 3);
        let svc = service::generate_replset_service(&cluster, &cluster.spec.replsets[0]);

        assert_eq!(svc.name_any(), "db1-rs0");
        assert_eq!(svc.namespace().as_deref(), Some("default"));

        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some(HEADLESS_CLUSTER_IP));
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
    }

    #[test]
    fn test_replset_service_selects_whole_replset() {
        let cluster = create_test_cluster("db1", "default", 3);
        let svc = service::generate_replset_service(&cluster, &cluster.spec.replsets[0]);

        let selector = svc.spec.unwrap().selector.unwrap();
        assert_eq!(selector.get(CLUSTER_LABEL).map(String::as_str), Some("db1"));
        assert_eq!(selector.get(REPLSET_LABEL).map(String::as_str), Some("rs0"));
        assert!(!selector.contains_key(POD_NAME_LABEL));
    }

    #[test]
    fn test_replset_service_ignores_exposure_mode() {
        for mode in [
            ExposureMode::Internal,
            ExposureMode::ClusterLocal,
            ExposureMode::NodeLocal,
            ExposureMode::LoadBalanced,
            ExposureMode::Unrecognized,
        ] {
            let cluster = create_exposed_cluster("db1", "default", mode);
            let svc = service::generate_replset_service(&cluster, &cluster.spec.replsets[0]);
            let spec = svc.spec.unwrap();
            assert_eq!(spec.type_.as_deref(), Some("ClusterIP"), "mode {}", mode);
            assert_eq!(spec.cluster_ip.as_deref(), Some(HEADLESS_CLUSTER_IP));
        }
    }

    #[test]
    fn test_replset_service_uses_configured_port() {
        let cluster = MongoDBClusterBuilder::new("db1", "default")
            .with_port(27018)
            .with_replset(ReplsetBuilder::new("rs0"))
            .build();
        let svc = service::generate_replset_service(&cluster, &cluster.spec.replsets[0]);

        let port = find_mongod_port(&svc).unwrap();
        assert_eq!(port.port, 27018);
        assert_eq!(
            port.target_port,
            Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(27018))
        );
    }

    #[test]
    fn test_replset_service_owner_reference() {
        let cluster = create_test_cluster("db1", "default", 3);
        let svc = service::generate_replset_service(&cluster, &cluster.spec.replsets[0]);

        let owners = svc.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "MongoDBCluster");
        assert_eq!(owners[0].name, "db1");
        assert_eq!(owners[0].uid, "test-uid-12345");
        assert_eq!(owners[0].controller, Some(true));
    }
}

mod external_service_tests {
    use super::*;

    #[test]
    fn test_external_service_targets_single_member() {
        let cluster = create_exposed_cluster("db1", "default", ExposureMode::ClusterLocal);
        let svc =
            service::generate_external_service(&cluster, &cluster.spec.replsets[0], "db1-rs0-0");

        assert_eq!(svc.name_any(), "db1-rs0-0");
        let selector = svc.spec.as_ref().unwrap().selector.clone().unwrap();
        assert_eq!(selector.len(), 1);
        assert_eq!(
            selector.get(POD_NAME_LABEL).map(String::as_str),
            Some("db1-rs0-0")
        );
        assert_eq!(
            svc.labels().get(EXPOSE_LABEL).map(String::as_str),
            Some("external")
        );
    }

    #[test]
    fn test_node_port_service() {
        let cluster = create_exposed_cluster("db1", "default", ExposureMode::NodeLocal);
        let svc =
            service::generate_external_service(&cluster, &cluster.spec.replsets[0], "db1-rs0-0");

        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert_eq!(
            spec.external_traffic_policy.as_deref(),
            Some(EXTERNAL_TRAFFIC_POLICY_LOCAL)
        );
        assert!(svc.metadata.annotations.is_none());
        assert_eq!(service_exposure_mode(&svc), ExposureMode::NodeLocal);
    }

    #[test]
    fn test_load_balancer_service() {
        let cluster = create_exposed_cluster("db1", "default", ExposureMode::LoadBalanced);
        let svc =
            service::generate_external_service(&cluster, &cluster.spec.replsets[0], "db1-rs0-1");

        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(
            spec.external_traffic_policy.as_deref(),
            Some(EXTERNAL_TRAFFIC_POLICY_LOCAL)
        );
        assert_eq!(
            svc.annotations()
                .get(LB_BACKEND_PROTOCOL_ANNOTATION)
                .map(String::as_str),
            Some("tcp")
        );
    }

    #[test]
    fn test_unrecognized_mode_falls_back_to_cluster_ip() {
        let cluster = create_exposed_cluster("db1", "default", ExposureMode::Unrecognized);
        let svc =
            service::generate_external_service(&cluster, &cluster.spec.replsets[0], "db1-rs0-0");

        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert!(spec.external_traffic_policy.is_none());
        assert!(spec.cluster_ip.is_none());
        assert!(svc.metadata.annotations.is_none());
    }

    #[test]
    fn test_user_annotations_override_operator_annotations() {
        let cluster = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(
                ReplsetBuilder::new("rs0")
                    .exposed(ExposureMode::LoadBalanced)
                    .with_service_annotation(LB_BACKEND_PROTOCOL_ANNOTATION, "ssl")
                    .with_service_annotation("example.com/team", "data"),
            )
            .build();
        let svc =
            service::generate_external_service(&cluster, &cluster.spec.replsets[0], "db1-rs0-0");

        let annotations = svc.annotations();
        assert_eq!(
            annotations
                .get(LB_BACKEND_PROTOCOL_ANNOTATION)
                .map(String::as_str),
            Some("ssl")
        );
        assert_eq!(
            annotations.get("example.com/team").map(String::as_str),
            Some("data")
        );
    }

    #[test]
    fn test_source_ranges_only_for_load_balancer() {
        let lb = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(
                ReplsetBuilder::new("rs0")
                    .exposed(ExposureMode::LoadBalanced)
                    .with_source_range("10.0.0.0/8"),
            )
            .build();
        let svc = service::generate_external_service(&lb, &lb.spec.replsets[0], "db1-rs0-0");
        assert_eq!(
            svc.spec.unwrap().load_balancer_source_ranges,
            Some(vec!["10.0.0.0/8".to_string()])
        );

        let np = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(
                ReplsetBuilder::new("rs0")
                    .exposed(ExposureMode::NodeLocal)
                    .with_source_range("10.0.0.0/8"),
            )
            .build();
        let svc = service::generate_external_service(&np, &np.spec.replsets[0], "db1-rs0-0");
        assert!(svc.spec.unwrap().load_balancer_source_ranges.is_none());
    }

    #[test]
    fn test_user_labels_cannot_override_selectors() {
        let cluster = MongoDBClusterBuilder::new("db1", "default")
            .with_label("team", "data")
            .with_label(CLUSTER_LABEL, "hijacked")
            .with_replset(ReplsetBuilder::new("rs0").exposed(ExposureMode::ClusterLocal))
            .build();
        let svc =
            service::generate_external_service(&cluster, &cluster.spec.replsets[0], "db1-rs0-0");

        let labels = svc.labels();
        assert_eq!(labels.get("team").map(String::as_str), Some("data"));
        assert_eq!(labels.get(CLUSTER_LABEL).map(String::as_str), Some("db1"));
    }
}

mod exposed_members_tests {
    use super::*;

    #[test]
    fn test_member_names() {
        assert_eq!(member_name("db1", "rs0", 0), "db1-rs0-0");
        assert_eq!(member_name("db1", "cfg", 2), "db1-cfg-2");
    }

    #[test]
    fn test_only_enabled_replsets_are_exposed() {
        let cluster = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(ReplsetBuilder::new("rs0").exposed(ExposureMode::LoadBalanced))
            .with_replset(
                ReplsetBuilder::new("rs1")
                    .with_size(2)
                    .with_mode(ExposureMode::NodeLocal),
            )
            .build();

        let members: Vec<String> = exposed_members(&cluster)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(members, vec!["db1-rs0-0", "db1-rs0-1", "db1-rs0-2"]);
    }

    #[test]
    fn test_no_exposed_members() {
        let cluster = create_test_cluster("db1", "default", 3);
        assert!(exposed_members(&cluster).is_empty());
    }
}

mod stale_service_tests {
    use super::*;

    fn exposed(size: i32, mode: ExposureMode) -> MongoDBCluster {
        MongoDBClusterBuilder::new("db1", "default")
            .with_replset(ReplsetBuilder::new("rs0").with_size(size).exposed(mode))
            .build()
    }

    /// Every service the given cluster would apply
    fn applied_services(cluster: &MongoDBCluster) -> Vec<Service> {
        let mut services: Vec<_> = cluster
            .spec
            .replsets
            .iter()
            .map(|rs| service::generate_replset_service(cluster, rs))
            .collect();
        for (replset, pod) in exposed_members(cluster) {
            services.push(service::generate_external_service(cluster, replset, &pod));
        }
        services
    }

    #[test]
    fn test_desired_names_cover_headless_and_members() {
        let cluster = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(
                ReplsetBuilder::new("rs0")
                    .with_size(2)
                    .exposed(ExposureMode::NodeLocal),
            )
            .with_replset(ReplsetBuilder::new("cfg"))
            .build();

        let desired: Vec<String> = desired_service_names(&cluster).into_iter().collect();
        assert_eq!(desired, vec!["db1-cfg", "db1-rs0", "db1-rs0-0", "db1-rs0-1"]);
    }

    #[test]
    fn test_nothing_stale_when_spec_unchanged() {
        let cluster = create_exposed_cluster("db1", "default", ExposureMode::LoadBalanced);
        let existing = applied_services(&cluster);

        assert!(stale_services(&cluster, &existing, &desired_service_names(&cluster)).is_empty());
    }

    #[test]
    fn test_shrunk_replset_members_are_stale() {
        let before = exposed(3, ExposureMode::LoadBalanced);
        let after = exposed(1, ExposureMode::LoadBalanced);

        let stale = stale_services(
            &after,
            &applied_services(&before),
            &desired_service_names(&after),
        );
        assert_eq!(stale, vec!["db1-rs0-1", "db1-rs0-2"]);
    }

    #[test]
    fn test_disabled_exposure_keeps_headless_service() {
        let before = exposed(2, ExposureMode::ClusterLocal);
        let after = create_test_cluster("db1", "default", 2);

        let stale = stale_services(
            &after,
            &applied_services(&before),
            &desired_service_names(&after),
        );
        assert_eq!(stale, vec!["db1-rs0-0", "db1-rs0-1"]);
    }

    #[test]
    fn test_removed_replset_headless_service_is_stale() {
        let before = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(ReplsetBuilder::new("rs0"))
            .with_replset(
                ReplsetBuilder::new("rs1")
                    .with_size(1)
                    .exposed(ExposureMode::NodeLocal),
            )
            .build();
        let after = MongoDBClusterBuilder::new("db1", "default")
            .with_replset(ReplsetBuilder::new("rs0"))
            .build();

        let stale = stale_services(
            &after,
            &applied_services(&before),
            &desired_service_names(&after),
        );
        assert_eq!(stale, vec!["db1-rs1", "db1-rs1-0"]);
    }

    #[test]
    fn test_services_of_other_owners_are_kept() {
        let cluster = create_test_cluster("db1", "default", 1);
        let foreign = StoredServiceBuilder::new("db1-legacy", "default")
            .cluster_ip("10.0.0.9")
            .build();
        let other = create_test_cluster("db2", "default", 1);
        let mut existing = applied_services(&other);
        existing.push(foreign);

        assert!(stale_services(&cluster, &existing, &desired_service_names(&cluster)).is_empty());
    }
}
