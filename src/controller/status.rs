//! Status and conditions management for MongoDBCluster resources
//!
//! This module provides utilities for managing Kubernetes-style conditions
//! and updating the status subresource.

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};

use crate::controller::Context;
use crate::controller::error::Result;
use crate::crd::{ClusterPhase, Condition, MemberStatus, MongoDBCluster, MongoDBClusterStatus};
use crate::resources::common::FIELD_MANAGER;

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Every exposed member has a resolved address
    pub const READY: &str = "Ready";
    /// Member addresses are still being resolved
    pub const PROGRESSING: &str = "Progressing";
    /// Cluster configuration is valid
    pub const CONFIG_VALID: &str = "ConfigurationValid";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    /// Create a new condition builder
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            conditions: Vec::new(),
            generation,
        }
    }

    /// Create from existing conditions
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    ///
    /// The transition time only moves when the status changes.
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    /// Set the Ready condition
    pub fn ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        self.set_condition(condition_types::READY, bool_status(is_ready), reason, message)
    }

    /// Set the Progressing condition
    pub fn progressing(self, is_progressing: bool, reason: &str, message: &str) -> Self {
        self.set_condition(
            condition_types::PROGRESSING,
            bool_status(is_progressing),
            reason,
            message,
        )
    }

    /// Set the ConfigurationValid condition from validation warnings
    pub fn config_valid(self, warnings: &[String]) -> Self {
        if warnings.is_empty() {
            self.set_condition(
                condition_types::CONFIG_VALID,
                condition_status::TRUE,
                "Valid",
                "Configuration is valid",
            )
        } else {
            // Still True: warnings fall back to defaults rather than blocking
            self.set_condition(
                condition_types::CONFIG_VALID,
                condition_status::TRUE,
                "ValidWithWarnings",
                &warnings.join("; "),
            )
        }
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

fn bool_status(value: bool) -> &'static str {
    if value {
        condition_status::TRUE
    } else {
        condition_status::FALSE
    }
}

/// Count members with a resolved address
pub fn resolved_members(members: &[MemberStatus]) -> usize {
    members.iter().filter(|m| m.address.is_some()).count()
}

/// Running only when every exposed member has an address and nothing failed
pub fn member_phase(members: &[MemberStatus], last_error: Option<&str>) -> ClusterPhase {
    if last_error.is_none() && resolved_members(members) == members.len() {
        ClusterPhase::Running
    } else {
        ClusterPhase::Exposing
    }
}

fn existing_conditions(cluster: &MongoDBCluster) -> Vec<Condition> {
    cluster
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default()
}

/// Status after a reconcile pass that resolved `members`
pub fn members_status(
    cluster: &MongoDBCluster,
    members: Vec<MemberStatus>,
    warnings: &[String],
    last_error: Option<String>,
) -> MongoDBClusterStatus {
    let generation = cluster.metadata.generation;
    let phase = member_phase(&members, last_error.as_deref());
    let message = format!(
        "{}/{} exposed members have an address",
        resolved_members(&members),
        members.len()
    );

    let builder = ConditionBuilder::from_existing(existing_conditions(cluster), generation);
    let conditions = match phase {
        ClusterPhase::Running => builder
            .ready(true, "MembersExposed", &message)
            .progressing(false, "Stable", "All services are applied"),
        _ => builder
            .ready(false, "AwaitingAddresses", &message)
            .progressing(true, "ResolvingAddresses", &message),
    }
    .config_valid(warnings)
    .build();

    MongoDBClusterStatus {
        phase,
        observed_generation: generation,
        conditions,
        members,
        last_error,
    }
}

/// Status after a reconcile that failed before member addresses were resolved
///
/// Member addresses from the previous status are kept.
pub fn failed_status(
    cluster: &MongoDBCluster,
    reason: &str,
    message: &str,
) -> MongoDBClusterStatus {
    let generation = cluster.metadata.generation;
    let conditions = ConditionBuilder::from_existing(existing_conditions(cluster), generation)
        .ready(false, reason, message)
        .progressing(false, "Failed", message)
        .build();

    MongoDBClusterStatus {
        phase: ClusterPhase::Failed,
        observed_generation: generation,
        conditions,
        members: cluster
            .status
            .as_ref()
            .map(|s| s.members.clone())
            .unwrap_or_default(),
        last_error: Some(message.to_string()),
    }
}

/// Status manager for MongoDBCluster resources
pub struct StatusManager<'a> {
    cluster: &'a MongoDBCluster,
    ctx: &'a Context,
    ns: &'a str,
}

impl<'a> StatusManager<'a> {
    /// Create a new status manager
    pub fn new(cluster: &'a MongoDBCluster, ctx: &'a Context, ns: &'a str) -> Self {
        Self { cluster, ctx, ns }
    }

    /// Update the cluster status with full status object
    pub async fn update(&self, status: MongoDBClusterStatus) -> Result<()> {
        let api: Api<MongoDBCluster> = Api::namespaced(self.ctx.client.clone(), self.ns);
        let name = self.cluster.name_any();

        let patch = serde_json::json!({
            "status": status
        });

        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }

    /// Record member addresses, Running once every member is resolved
    pub async fn set_members(
        &self,
        members: Vec<MemberStatus>,
        warnings: &[String],
        last_error: Option<String>,
    ) -> Result<()> {
        self.update(members_status(self.cluster, members, warnings, last_error))
            .await
    }

    /// Update status for a failed reconciliation, keeping known member addresses
    pub async fn set_failed(&self, reason: &str, message: &str) -> Result<()> {
        self.update(failed_status(self.cluster, reason, message))
            .await
    }
}

/// Check if the cluster spec has changed by comparing observed generation
pub fn spec_changed(cluster: &MongoDBCluster) -> bool {
    let current_generation = cluster.metadata.generation;
    let observed_generation = cluster.status.as_ref().and_then(|s| s.observed_generation);

    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        _ => true,
    }
}
