//! Address resolution for exposed replica set members
//!
//! Given a member's materialized service and its pod, work out the
//! `host:port` an external client should use:
//!
//! - `ClusterIP`: the service's cluster IP and declared port
//! - `NodePort`: the pod's host IP and the node port allocated for mongod
//! - `LoadBalancer`: the first ingress point the cloud provider assigns,
//!   polled from the API server until it appears
//!
//! Polling is the only part that waits. It runs on a fixed tick, gives up
//! after a bounded number of attempts, fails fast on fetch errors and stops
//! as soon as the supplied [`CancellationToken`] fires.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{Api, Client, ResourceExt};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::crd::ExposureMode;
use crate::resources::service::{find_mongod_port, service_exposure_mode};

/// Default interval between ingress polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of polls before giving up (15 minutes at the default interval)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 900;

/// Environment variable overriding the poll interval, in seconds
pub const POLL_INTERVAL_ENV: &str = "MONGODB_OPERATOR_INGRESS_POLL_INTERVAL_SECS";

/// Environment variable overriding the attempt budget
pub const MAX_ATTEMPTS_ENV: &str = "MONGODB_OPERATOR_INGRESS_MAX_ATTEMPTS";

/// Errors that end an address resolution
#[derive(Error, Debug)]
pub enum AddressError {
    /// The service lookup itself failed
    #[error("failed to fetch service {service}: {source}")]
    FetchError {
        service: String,
        #[source]
        source: kube::Error,
    },

    /// No ingress point appeared within the attempt budget
    #[error("no ingress point for service {service} after {attempts} attempts")]
    Timeout { service: String, attempts: u32 },

    /// The provider assigned an ingress point without IP or hostname
    #[error("cannot fetch any hostname from ingress for service {service}")]
    NoAddress { service: String },

    /// The caller gave up waiting
    #[error("address resolution for service {service} was cancelled")]
    Cancelled { service: String },

    /// The service or pod lacks a field its exposure mode needs
    #[error("service {service} has no {field} yet")]
    Incomplete {
        service: String,
        field: &'static str,
    },

    /// The resolver was configured with a zero poll interval
    #[error("cannot poll service {service}: poll interval must be non-zero")]
    InvalidConfig { service: String },
}

impl AddressError {
    /// Whether a later reconciliation might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AddressError::FetchError { .. } => true,
            AddressError::Timeout { .. } => true,
            AddressError::Cancelled { .. } => true,
            AddressError::Incomplete { .. } => true,
            AddressError::InvalidConfig { .. } => false,
            // Provider contract violation, retrying the same provider won't help
            AddressError::NoAddress { .. } => false,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AddressError::FetchError { .. } => "fetch_error",
            AddressError::Timeout { .. } => "timeout",
            AddressError::NoAddress { .. } => "no_address",
            AddressError::Cancelled { .. } => "cancelled",
            AddressError::Incomplete { .. } => "incomplete",
            AddressError::InvalidConfig { .. } => "invalid_config",
        }
    }
}

/// A resolved `host:port` pair
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceAddress {
    /// Cluster IP, node IP, or provider-assigned IP/hostname
    pub host: String,
    pub port: i32,
}

impl std::fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Result of a single ingress poll
#[derive(Debug)]
pub enum PollOutcome {
    Resolved(ServiceAddress),
    Pending,
    Failed(AddressError),
}

/// Timing of the ingress polling loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Wait before each poll
    pub poll_interval: Duration,
    /// Polls before giving up with [`AddressError::Timeout`]
    pub max_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ResolverConfig {
    /// Defaults, overridden by [`POLL_INTERVAL_ENV`] and [`MAX_ATTEMPTS_ENV`].
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.poll_interval = Duration::from_secs(secs),
                _ => warn!(
                    value = %raw,
                    "Ignoring invalid {}, using {:?}",
                    POLL_INTERVAL_ENV,
                    config.poll_interval
                ),
            }
        }

        if let Some(raw) = lookup(MAX_ATTEMPTS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(attempts) if attempts > 0 => config.max_attempts = attempts,
                _ => warn!(
                    value = %raw,
                    "Ignoring invalid {}, using {}",
                    MAX_ATTEMPTS_ENV,
                    config.max_attempts
                ),
            }
        }

        config
    }

    /// Longest time a single resolution can wait for an ingress point
    pub fn max_wait(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_attempts)
    }
}

/// Read access to services in the cluster
///
/// Implemented for [`kube::Client`]; tests substitute scripted stores.
pub trait ServiceStore: Send + Sync {
    fn get_service(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<Service, kube::Error>> + Send;
}

impl ServiceStore for Client {
    async fn get_service(&self, name: &str, namespace: &str) -> Result<Service, kube::Error> {
        let api: Api<Service> = Api::namespaced(self.clone(), namespace);
        api.get(name).await
    }
}

/// Resolve the address clients should use to reach a member
///
/// `svc` is the member's service as stored by the API server (so that the
/// cluster IP and node port are populated) and `pod` the member itself.
/// Only `LoadBalancer` services wait; the other types resolve immediately.
pub async fn resolve_service_address<S>(
    svc: &Service,
    pod: &Pod,
    store: &S,
    config: &ResolverConfig,
    cancel: &CancellationToken,
) -> Result<ServiceAddress, AddressError>
where
    S: ServiceStore,
{
    let service = svc.name_any();
    let port = find_mongod_port(svc).ok_or_else(|| AddressError::Incomplete {
        service: service.clone(),
        field: "mongodb port",
    })?;

    match service_exposure_mode(svc) {
        ExposureMode::NodeLocal => {
            let host = pod
                .status
                .as_ref()
                .and_then(|s| s.host_ip.clone())
                .filter(|ip| !ip.is_empty())
                .ok_or_else(|| AddressError::Incomplete {
                    service: service.clone(),
                    field: "pod host IP",
                })?;
            let node_port = port.node_port.ok_or_else(|| AddressError::Incomplete {
                service: service.clone(),
                field: "node port",
            })?;
            Ok(ServiceAddress {
                host,
                port: node_port,
            })
        }
        ExposureMode::LoadBalanced => {
            let name = pod.name_any();
            let namespace = pod.namespace().unwrap_or_default();
            wait_for_ingress(store, &name, &namespace, port.port, config, cancel).await
        }
        ExposureMode::Internal | ExposureMode::ClusterLocal | ExposureMode::Unrecognized => {
            let host = svc
                .spec
                .as_ref()
                .and_then(|s| s.cluster_ip.clone())
                .filter(|ip| !ip.is_empty())
                .ok_or(AddressError::Incomplete {
                    service,
                    field: "cluster IP",
                })?;
            Ok(ServiceAddress {
                host,
                port: port.port,
            })
        }
    }
}

/// Poll a load-balanced service until the provider assigns an ingress point
///
/// The first fetch happens one interval after the call. Exits on the first
/// ingress point, the first fetch error, cancellation, or after
/// `config.max_attempts` fetches. A zero interval is rejected up front.
pub async fn wait_for_ingress<S>(
    store: &S,
    name: &str,
    namespace: &str,
    port: i32,
    config: &ResolverConfig,
    cancel: &CancellationToken,
) -> Result<ServiceAddress, AddressError>
where
    S: ServiceStore,
{
    // interval_at panics on a zero period
    if config.poll_interval.is_zero() {
        warn!(service = %name, "Refusing to poll with a zero interval");
        return Err(AddressError::InvalidConfig {
            service: name.to_string(),
        });
    }

    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + config.poll_interval, config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(service = %name, attempt, "Ingress polling cancelled");
                return Err(AddressError::Cancelled {
                    service: name.to_string(),
                });
            }
            _ = ticker.tick() => {}
        }

        match poll_ingress(store, name, namespace, port).await {
            PollOutcome::Resolved(address) => {
                debug!(
                    service = %name,
                    %address,
                    attempt,
                    elapsed = ?started.elapsed(),
                    "Ingress point assigned"
                );
                return Ok(address);
            }
            PollOutcome::Pending => {
                trace!(service = %name, attempt, "Waiting for ingress point");
            }
            PollOutcome::Failed(e) => {
                warn!(service = %name, attempt, error = %e, "Ingress polling failed");
                return Err(e);
            }
        }
    }

    warn!(
        service = %name,
        attempts = config.max_attempts,
        "Gave up waiting for ingress point"
    );
    Err(AddressError::Timeout {
        service: name.to_string(),
        attempts: config.max_attempts,
    })
}

/// Fetch the service once and evaluate its ingress list
pub async fn poll_ingress<S>(store: &S, name: &str, namespace: &str, port: i32) -> PollOutcome
where
    S: ServiceStore,
{
    match store.get_service(name, namespace).await {
        Ok(svc) => evaluate_ingress(&svc, port),
        Err(source) => PollOutcome::Failed(AddressError::FetchError {
            service: name.to_string(),
            source,
        }),
    }
}

/// Evaluate the ingress list of a load-balanced service
///
/// Only the first ingress point is considered. Its IP is preferred over
/// its hostname; empty strings count as absent.
pub fn evaluate_ingress(svc: &Service, port: i32) -> PollOutcome {
    let first = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first());

    let Some(ingress) = first else {
        return PollOutcome::Pending;
    };

    let ip = ingress.ip.as_deref().filter(|ip| !ip.is_empty());
    let hostname = ingress.hostname.as_deref().filter(|h| !h.is_empty());

    match ip.or(hostname) {
        Some(host) => PollOutcome::Resolved(ServiceAddress {
            host: host.to_string(),
            port,
        }),
        None => PollOutcome::Failed(AddressError::NoAddress {
            service: svc.name_any(),
        }),
    }
}
