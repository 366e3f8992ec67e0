//! Validation logic for MongoDBCluster specs
//!
//! Hard errors stop reconciliation. Unrecognized exposure types are only
//! warnings: they fall back to ClusterIP.

use std::collections::BTreeSet;

use crate::controller::error::{Error, Result};
use crate::crd::{ExposureMode, MongoDBCluster};

/// Minimum number of members per replica set
pub const MIN_REPLSET_SIZE: i32 = 1;

/// Maximum number of members per replica set (MongoDB voting member limit is 7, total 50)
pub const MAX_REPLSET_SIZE: i32 = 50;

/// Validate the cluster spec
pub fn validate_spec(cluster: &MongoDBCluster) -> Result<()> {
    validate_port(cluster.spec.mongod.net.port)?;

    if cluster.spec.replsets.is_empty() {
        return Err(Error::ValidationError(
            "at least one replset is required".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for replset in &cluster.spec.replsets {
        validate_replset_name(&replset.name)?;
        if !seen.insert(replset.name.as_str()) {
            return Err(Error::ValidationError(format!(
                "duplicate replset name: {}",
                replset.name
            )));
        }
        validate_replset_size(&replset.name, replset.size)?;
    }

    Ok(())
}

/// Non-fatal spec problems worth surfacing to the user
pub fn exposure_warnings(cluster: &MongoDBCluster) -> Vec<String> {
    cluster
        .spec
        .replsets
        .iter()
        .filter(|rs| rs.expose.enabled && rs.expose.expose_type == ExposureMode::Unrecognized)
        .map(|rs| {
            format!(
                "replset {} has an unrecognized exposeType, falling back to ClusterIP",
                rs.name
            )
        })
        .collect()
}

fn validate_port(port: i32) -> Result<()> {
    if !(1..=65535).contains(&port) {
        return Err(Error::ValidationError(format!(
            "mongod port {} is out of range 1-65535",
            port
        )));
    }
    Ok(())
}

/// Replset names end up in service and pod names, so they must be DNS labels
fn validate_replset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::ValidationError(
            "replset name must not be empty".to_string(),
        ));
    }

    if name.len() > 63 {
        return Err(Error::ValidationError(format!(
            "replset name {} is longer than 63 characters",
            name
        )));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || name.starts_with('-') || name.ends_with('-') {
        return Err(Error::ValidationError(format!(
            "replset name {} must consist of lowercase alphanumerics and '-', and start and end with an alphanumeric",
            name
        )));
    }

    Ok(())
}

fn validate_replset_size(name: &str, size: i32) -> Result<()> {
    if size < MIN_REPLSET_SIZE {
        return Err(Error::ValidationError(format!(
            "replset {} size {} is below minimum {}",
            name, size, MIN_REPLSET_SIZE
        )));
    }

    if size > MAX_REPLSET_SIZE {
        return Err(Error::ValidationError(format!(
            "replset {} size {} exceeds maximum {}",
            name, size, MAX_REPLSET_SIZE
        )));
    }

    Ok(())
}
