//! Replica-managing controllers.

use kdeploy_core::{FieldError, Object};

use crate::{all_equal, conditions, generation_matches};

const SPEC_REPLICAS: &[&str] = &["spec", "replicas"];
const REPLICAS: &[&str] = &["status", "replicas"];
const READY: &[&str] = &["status", "readyReplicas"];
const AVAILABLE: &[&str] = &["status", "availableReplicas"];
const CURRENT: &[&str] = &["status", "currentReplicas"];
const DESIRED_SCHEDULED: &[&str] = &["status", "desiredNumberScheduled"];
const NUMBER_AVAILABLE: &[&str] = &["status", "numberAvailable"];
const NUMBER_READY: &[&str] = &["status", "numberReady"];

pub(crate) fn daemon_set(obj: &Object) -> Result<bool, FieldError> {
    if !generation_matches(obj)? {
        return Ok(false);
    }
    all_equal(obj, &[DESIRED_SCHEDULED, NUMBER_AVAILABLE, NUMBER_READY])
}

/// Every condition must be a recognized healthy one; an unrecognized type is not ready.
pub(crate) fn deployment(obj: &Object) -> Result<bool, FieldError> {
    if !generation_matches(obj)? || !all_equal(obj, &[SPEC_REPLICAS, REPLICAS, READY, AVAILABLE])? {
        return Ok(false);
    }
    let conds = match conditions(obj)? {
        Some(c) if !c.is_empty() => c,
        _ => return Ok(false),
    };
    for c in conds {
        let healthy = match c.kind {
            "Available" => c.status == "True",
            "Progressing" => c.status == "True" && c.reason == "NewReplicaSetAvailable",
            "ReplicaFailure" => c.status != "True",
            _ => false,
        };
        if !healthy {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Unlike Deployment, unknown condition types are ignored here.
pub(crate) fn replica_set(obj: &Object) -> Result<bool, FieldError> {
    if !generation_matches(obj)? || !all_equal(obj, &[SPEC_REPLICAS, REPLICAS, READY, AVAILABLE])? {
        return Ok(false);
    }
    let failed = conditions(obj)?
        .unwrap_or_default()
        .iter()
        .any(|c| c.kind == "ReplicaFailure" && c.status == "True");
    Ok(!failed)
}

pub(crate) fn replication_controller(obj: &Object) -> Result<bool, FieldError> {
    Ok(generation_matches(obj)? && all_equal(obj, &[SPEC_REPLICAS, REPLICAS, READY, AVAILABLE])?)
}

pub(crate) fn stateful_set(obj: &Object) -> Result<bool, FieldError> {
    Ok(generation_matches(obj)? && all_equal(obj, &[SPEC_REPLICAS, REPLICAS, READY, CURRENT])?)
}
