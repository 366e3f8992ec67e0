use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// MongoDBCluster is the Schema for the mongodbclusters API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "mongodb-operator.smoketurner.com",
    version = "v1alpha1",
    kind = "MongoDBCluster",
    plural = "mongodbclusters",
    shortname = "mdbc",
    namespaced,
    status = "MongoDBClusterStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBClusterSpec {
    /// mongod process configuration
    #[serde(default)]
    pub mongod: MongodSpec,

    /// Replica sets that make up the cluster
    pub replsets: Vec<ReplsetSpec>,

    /// User-defined labels added to every generated resource (e.g. team, cost-center)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// mongod process configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpec {
    /// Network settings
    #[serde(default)]
    pub net: NetSpec,
}

/// mongod network settings
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetSpec {
    /// Port mongod listens on. Every service targets this port.
    #[serde(default = "default_mongod_port")]
    pub port: i32,
}

impl Default for NetSpec {
    fn default() -> Self {
        Self {
            port: default_mongod_port(),
        }
    }
}

fn default_mongod_port() -> i32 {
    27017
}

/// A named replica set within the cluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetSpec {
    /// Replica set name (e.g. "rs0")
    pub name: String,

    /// Number of members. Members are named `<cluster>-<replset>-<ordinal>`.
    #[serde(default = "default_replset_size")]
    pub size: i32,

    /// How members are exposed outside the replica set's headless service
    #[serde(default)]
    pub expose: ExposeSpec,
}

fn default_replset_size() -> i32 {
    3
}

/// Per-member exposure configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExposeSpec {
    /// Create one service per member
    #[serde(default)]
    pub enabled: bool,

    /// ClusterIP, NodePort, LoadBalancer or Internal.
    /// Anything else falls back to ClusterIP.
    #[serde(default)]
    #[schemars(with = "String")]
    pub expose_type: ExposureMode,

    /// Extra annotations for the per-member services.
    /// These take precedence over operator-set annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service_annotations: BTreeMap<String, String>,

    /// Source CIDRs allowed through a LoadBalancer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_source_ranges: Vec<String>,
}

/// Network visibility of a replica set member
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExposureMode {
    /// Reachable only through the replica set's headless service
    Internal,
    /// Per-member virtual cluster IP
    #[default]
    #[serde(rename = "ClusterIP", alias = "ClusterLocal")]
    ClusterLocal,
    /// Port on the member's host node
    #[serde(rename = "NodePort", alias = "NodeLocal")]
    NodeLocal,
    /// Provider-assigned external address
    #[serde(rename = "LoadBalancer", alias = "LoadBalanced")]
    LoadBalanced,
    /// Any value this operator does not know about
    #[serde(other)]
    Unrecognized,
}

impl ExposureMode {
    /// Kubernetes service type backing this mode
    pub fn service_type(&self) -> &'static str {
        match self {
            ExposureMode::NodeLocal => "NodePort",
            ExposureMode::LoadBalanced => "LoadBalancer",
            ExposureMode::Internal | ExposureMode::ClusterLocal | ExposureMode::Unrecognized => {
                "ClusterIP"
            }
        }
    }

    /// Map a Kubernetes service type back to a mode.
    ///
    /// Services without a type are ClusterIP, as on the API server.
    pub fn from_service_type(type_: Option<&str>) -> Self {
        match type_ {
            Some("NodePort") => ExposureMode::NodeLocal,
            Some("LoadBalancer") => ExposureMode::LoadBalanced,
            None | Some("ClusterIP") => ExposureMode::ClusterLocal,
            Some(_) => ExposureMode::Unrecognized,
        }
    }
}

impl std::fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExposureMode::Internal => write!(f, "Internal"),
            ExposureMode::ClusterLocal => write!(f, "ClusterIP"),
            ExposureMode::NodeLocal => write!(f, "NodePort"),
            ExposureMode::LoadBalanced => write!(f, "LoadBalancer"),
            ExposureMode::Unrecognized => write!(f, "Unrecognized"),
        }
    }
}

/// Status of the MongoDBCluster
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBClusterStatus {
    /// Current phase of the cluster exposure lifecycle
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Exposure state of every externally exposed member
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberStatus>,

    /// Last reconciliation error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Resolved address of a single exposed member
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    /// Pod name of the member
    pub name: String,

    /// Replica set the member belongs to
    pub replset: String,

    /// Service type used to expose the member
    pub expose_type: String,

    /// `host:port` clients should use, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Why the address is not known yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Cluster exposure phase
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub enum ClusterPhase {
    /// Cluster has not been reconciled yet
    #[default]
    Pending,
    /// Services are applied, some member addresses are still unknown
    Exposing,
    /// Every exposed member has a resolved address
    Running,
    /// Reconciliation failed
    Failed,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Exposing => write!(f, "Exposing"),
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
