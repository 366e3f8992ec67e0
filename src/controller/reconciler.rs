//! Reconciliation logic for MongoDBCluster resources
//!
//! Applies the headless service of every replica set and, for replica sets
//! with exposure enabled, one service per member. Member addresses are then
//! resolved concurrently and written to the status.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::status::{StatusManager, resolved_members, spec_changed};
use crate::controller::validation::{exposure_warnings, validate_spec};
use crate::crd::{MemberStatus, MongoDBCluster, ReplsetSpec};
use crate::resources::address::resolve_service_address;
use crate::resources::common::{CLUSTER_LABEL, FIELD_MANAGER, KIND, REPLSET_LABEL, member_name};
use crate::resources::service::{self, service_exposure_mode};

/// Requeue interval once every exposed member has an address
const RESOLVED_REQUEUE: Duration = Duration::from_secs(300);

/// Requeue interval while members are missing or still unresolved
const PENDING_REQUEUE: Duration = Duration::from_secs(30);

/// Main reconciliation function
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = %cluster.namespace().unwrap_or_default()))]
pub async fn reconcile(cluster: Arc<MongoDBCluster>, ctx: Arc<Context>) -> Result<Action> {
    let ns = cluster
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = cluster.name_any();
    let key = format!("{}/{}", ns, name);
    let started = Instant::now();

    info!("Reconciling MongoDBCluster");

    if spec_changed(&cluster) {
        info!(
            "Spec changed for {} (observed: {:?}, generation: {:?})",
            name,
            cluster.status.as_ref().and_then(|s| s.observed_generation),
            cluster.metadata.generation
        );
    }

    let result = reconcile_cluster(&cluster, &ctx, &ns).await;

    if let Some(state) = &ctx.health_state {
        match &result {
            Ok(_) => state
                .metrics
                .record_reconcile(&ns, &name, started.elapsed().as_secs_f64()),
            Err(_) => state.metrics.record_error(&ns, &name),
        }
    }

    match result {
        Ok(action) => {
            info!("Reconciliation completed successfully");
            ctx.failures.reset(&key);
            Ok(action)
        }
        // Member failures were written alongside the other members' addresses
        Err(e) if e.is_recorded_in_status() => Err(e),
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            let status_manager = StatusManager::new(&cluster, &ctx, &ns);
            if let Err(status_err) = status_manager
                .set_failed("ReconciliationFailed", &e.to_string())
                .await
            {
                warn!("Failed to record failure in status: {}", status_err);
            }
            Err(e)
        }
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(cluster: Arc<MongoDBCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = cluster.name_any();
    let key = format!("{}/{}", cluster.namespace().unwrap_or_default(), name);
    let backoff = BackoffConfig::default();

    let attempt = ctx.failures.record_failure(&key);
    let delay = backoff.delay_for_error(error, attempt);

    if error.is_retryable() {
        warn!(
            "Retryable error for {} (attempt {}): {:?}, requeuing in {:?}",
            name,
            attempt + 1,
            error,
            delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

/// Every externally exposed member as (replset, pod name)
pub fn exposed_members(cluster: &MongoDBCluster) -> Vec<(&ReplsetSpec, String)> {
    let cluster_name = cluster.name_any();
    cluster
        .spec
        .replsets
        .iter()
        .filter(|rs| rs.expose.enabled)
        .flat_map(|rs| {
            let cluster_name = cluster_name.clone();
            (0..rs.size).map(move |ordinal| (rs, member_name(&cluster_name, &rs.name, ordinal)))
        })
        .collect()
}

/// Names of every service the cluster should own: headless replset services
/// and one per exposed member
pub fn desired_service_names(cluster: &MongoDBCluster) -> BTreeSet<String> {
    let cluster_name = cluster.name_any();
    cluster
        .spec
        .replsets
        .iter()
        .map(|rs| service::replset_service_name(&cluster_name, &rs.name))
        .chain(exposed_members(cluster).into_iter().map(|(_, pod)| pod))
        .collect()
}

/// Services owned by `cluster` whose names are no longer desired
///
/// Covers replica sets that shrank, had exposure disabled or were removed.
pub fn stale_services(
    cluster: &MongoDBCluster,
    existing: &[Service],
    desired: &BTreeSet<String>,
) -> Vec<String> {
    let cluster_name = cluster.name_any();
    existing
        .iter()
        .filter(|svc| {
            svc.owner_references()
                .iter()
                .any(|o| o.kind == KIND && o.name == cluster_name)
        })
        .map(|svc| svc.name_any())
        .filter(|name| !desired.contains(name))
        .collect()
}

/// Outcome of resolving every exposed member
#[derive(Debug)]
pub enum MembersOutcome {
    /// Every member ran to completion; `error` is the first member failure
    Observed {
        members: Vec<MemberStatus>,
        error: Option<Error>,
    },
    /// Resolution was cut short by shutdown, nothing worth persisting
    Interrupted,
}

/// Fold per-member results into a single outcome
pub fn collect_members(results: Vec<(MemberStatus, Option<Error>)>) -> MembersOutcome {
    if results
        .iter()
        .any(|(_, err)| err.as_ref().is_some_and(Error::is_cancelled))
    {
        return MembersOutcome::Interrupted;
    }

    let mut members = Vec::with_capacity(results.len());
    let mut error = None;
    for (status, err) in results {
        members.push(status);
        if error.is_none() {
            error = err;
        }
    }
    MembersOutcome::Observed { members, error }
}

/// Requeue sooner while any member is still missing an address
pub fn requeue_after(members: &[MemberStatus]) -> Duration {
    if resolved_members(members) == members.len() {
        RESOLVED_REQUEUE
    } else {
        PENDING_REQUEUE
    }
}

async fn reconcile_cluster(cluster: &MongoDBCluster, ctx: &Context, ns: &str) -> Result<Action> {
    validate_spec(cluster)?;

    let warnings = exposure_warnings(cluster);
    for warning in &warnings {
        warn!("{}", warning);
    }

    for replset in &cluster.spec.replsets {
        let svc = service::generate_replset_service(cluster, replset);
        apply_resource(ctx, ns, &svc).await?;
    }

    let members = exposed_members(cluster);
    for (replset, pod_name) in &members {
        let svc = service::generate_external_service(cluster, replset, pod_name);
        apply_resource(ctx, ns, &svc).await?;
    }

    cleanup_stale_services(cluster, ctx, ns).await?;

    let results = join_all(
        members
            .iter()
            .map(|(replset, pod_name)| resolve_member(ctx, ns, replset, pod_name)),
    )
    .await;

    let (members, first_error) = match collect_members(results) {
        MembersOutcome::Observed { members, error } => (members, error),
        MembersOutcome::Interrupted => {
            info!("Address resolution interrupted by shutdown, leaving status untouched");
            return Ok(Action::await_change());
        }
    };

    let requeue = requeue_after(&members);
    let status_manager = StatusManager::new(cluster, ctx, ns);
    status_manager
        .set_members(
            members,
            &warnings,
            first_error.as_ref().map(|e| e.to_string()),
        )
        .await?;

    match first_error {
        Some(err) => Err(err),
        None => Ok(Action::requeue(requeue)),
    }
}

/// Resolve one member's address
///
/// Missing pods are not an error: pod lifecycle belongs to the StatefulSet.
async fn resolve_member(
    ctx: &Context,
    ns: &str,
    replset: &ReplsetSpec,
    pod_name: &str,
) -> (MemberStatus, Option<Error>) {
    let mut status = MemberStatus {
        name: pod_name.to_string(),
        replset: replset.name.clone(),
        expose_type: replset.expose.expose_type.service_type().to_string(),
        address: None,
        message: None,
    };

    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), ns);
    let pod = match pods.get_opt(pod_name).await {
        Ok(Some(pod)) => pod,
        Ok(None) => {
            debug!(member = %pod_name, "Member pod does not exist yet");
            status.message = Some("pod not created yet".to_string());
            return (status, None);
        }
        Err(e) => {
            status.message = Some(format!("failed to fetch pod: {}", e));
            return (status, Some(member_error(pod_name, e)));
        }
    };

    // Read back the stored service: cluster IP and node port are assigned server-side
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), ns);
    let svc = match services.get(pod_name).await {
        Ok(svc) => svc,
        Err(e) => {
            status.message = Some(format!("failed to fetch service: {}", e));
            return (status, Some(member_error(pod_name, e)));
        }
    };

    let mode = service_exposure_mode(&svc);
    let started = Instant::now();
    let result =
        resolve_service_address(&svc, &pod, &ctx.client, &ctx.resolver, &ctx.shutdown).await;

    if let Some(state) = &ctx.health_state {
        let outcome = match &result {
            Ok(_) => "resolved",
            Err(e) => e.kind(),
        };
        state.metrics.record_resolution(
            &mode.to_string(),
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }

    match result {
        Ok(address) => {
            debug!(member = %pod_name, %address, "Resolved member address");
            status.address = Some(address.to_string());
            (status, None)
        }
        Err(e) => {
            warn!(member = %pod_name, error = %e, "Failed to resolve member address");
            status.message = Some(e.to_string());
            (status, Some(member_error(pod_name, e)))
        }
    }
}

fn member_error(member: &str, source: impl Into<Error>) -> Error {
    Error::MemberError {
        member: member.to_string(),
        source: Box::new(source.into()),
    }
}

/// Delete services this cluster created that are no longer desired
async fn cleanup_stale_services(cluster: &MongoDBCluster, ctx: &Context, ns: &str) -> Result<()> {
    let api: Api<Service> = Api::namespaced(ctx.client.clone(), ns);
    let selector = format!("{}={},{}", CLUSTER_LABEL, cluster.name_any(), REPLSET_LABEL);

    let existing = api.list(&ListParams::default().labels(&selector)).await?;
    let desired = desired_service_names(cluster);
    for name in stale_services(cluster, &existing.items, &desired) {
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => info!("Deleted stale service: {}", name),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Apply a Kubernetes resource using server-side apply
async fn apply_resource<T>(ctx: &Context, ns: &str, resource: &T) -> Result<()>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + serde::Serialize
        + DeserializeOwned
        + Clone
        + std::fmt::Debug,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(ctx.client.clone(), ns);
    let name = resource.name_any();

    let patch = Patch::Apply(resource);
    let params = PatchParams::apply(FIELD_MANAGER).force();

    api.patch(&name, &params, &patch).await?;
    debug!("Applied resource: {}", name);

    Ok(())
}
