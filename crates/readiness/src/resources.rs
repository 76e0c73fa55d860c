//! Pods, claims, disruption budgets and services.

use kdeploy_core::{FieldError, Object};
use serde_json::Value as Json;

use crate::{conditions, generation_matches};

pub(crate) fn persistent_volume_claim(obj: &Object) -> Result<bool, FieldError> {
    Ok(obj.nested_str(&["status", "phase"])? == Some("Bound"))
}

/// Ready, or finished successfully.
pub(crate) fn pod(obj: &Object) -> Result<bool, FieldError> {
    Ok(conditions(obj)?
        .unwrap_or_default()
        .iter()
        .any(|c| c.kind == "Ready" && (c.status == "True" || c.reason == "PodCompleted")))
}

pub(crate) fn pod_disruption_budget(obj: &Object) -> Result<bool, FieldError> {
    if !generation_matches(obj)? {
        return Ok(false);
    }
    let current = obj.nested_i64(&["status", "currentHealthy"])?;
    let desired = obj.nested_i64(&["status", "desiredHealthy"])?;
    Ok(matches!((current, desired), (Some(c), Some(d)) if c >= d))
}

pub(crate) fn service(obj: &Object) -> Result<bool, FieldError> {
    match obj.nested_str(&["spec", "type"])? {
        Some("ClusterIP" | "NodePort" | "ExternalName") => Ok(true),
        Some("LoadBalancer") => load_balancer_ready(obj),
        _ => Ok(false),
    }
}

fn load_balancer_ready(obj: &Object) -> Result<bool, FieldError> {
    if obj.nested_str(&["spec", "clusterIP"])?.unwrap_or_default().is_empty() {
        return Ok(false);
    }
    let ingress = match obj.nested_slice(&["status", "loadBalancer", "ingress"])? {
        Some(list) if !list.is_empty() => list,
        _ => return Ok(false),
    };
    for (idx, entry) in ingress.iter().enumerate() {
        let ip = match entry {
            Json::Object(m) => m.get("ip"),
            _ => {
                return Err(FieldError::WrongType {
                    path: format!("status.loadBalancer.ingress[{}]", idx),
                    expected: "map",
                    found: "non-map",
                })
            }
        };
        match ip {
            Some(Json::String(s)) if !s.is_empty() => {}
            None | Some(Json::Null) | Some(Json::String(_)) => return Ok(false),
            Some(_) => {
                return Err(FieldError::WrongType {
                    path: format!("status.loadBalancer.ingress[{}].ip", idx),
                    expected: "string",
                    found: "non-string",
                })
            }
        }
    }
    Ok(true)
}
