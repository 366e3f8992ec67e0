use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::controller::error::FailureTracker;
use crate::health::HealthState;
use crate::resources::address::ResolverConfig;

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Health state for recording metrics, absent in tests
    pub health_state: Option<Arc<HealthState>>,
    /// Ingress polling timing
    pub resolver: ResolverConfig,
    /// Cancelled on shutdown to abort in-flight ingress polls
    pub shutdown: CancellationToken,
    /// Consecutive failures per cluster, for backoff
    pub failures: Arc<FailureTracker>,
}

impl Context {
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            health_state,
            resolver: ResolverConfig::from_env(),
            shutdown: CancellationToken::new(),
            failures: Arc::new(FailureTracker::default()),
        }
    }

    /// Share a shutdown token with the caller
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
