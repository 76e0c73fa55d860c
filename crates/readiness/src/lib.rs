//! kdeploy readiness engine.
//!
//! A registration table maps a resource kind to a predicate over the object's status.
//! Predicates read fields defensively: a missing field means "not ready yet", a field of
//! the wrong shape is an error, never coerced to "not ready". Kinds without a predicate
//! are considered ready as soon as they are applied.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use kdeploy_core::{FieldError, Object};
use once_cell::sync::Lazy;
use serde_json::Value as Json;

mod controllers;
mod resources;

/// Decides convergence of one object from its status fields.
pub type Predicate = fn(&Object) -> Result<bool, FieldError>;

#[derive(Clone, Default)]
pub struct Registry {
    predicates: HashMap<String, Predicate>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Registry").field("kinds", &kinds).finish()
    }
}

impl Registry {
    /// A registry with no predicates; every kind is ready.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The predicates for the built-in Kubernetes kinds.
    pub fn with_builtin() -> Self {
        let mut r = Self::empty();
        r.register("DaemonSet", controllers::daemon_set);
        r.register("Deployment", controllers::deployment);
        r.register("ReplicaSet", controllers::replica_set);
        r.register("ReplicationController", controllers::replication_controller);
        r.register("StatefulSet", controllers::stateful_set);
        r.register("PersistentVolumeClaim", resources::persistent_volume_claim);
        r.register("Pod", resources::pod);
        r.register("PodDisruptionBudget", resources::pod_disruption_budget);
        r.register("Service", resources::service);
        r
    }

    /// Register (or replace) the predicate for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, predicate: Predicate) -> Option<Predicate> {
        self.predicates.insert(kind.into(), predicate)
    }

    pub fn has_predicate(&self, kind: &str) -> bool {
        self.predicates.contains_key(kind)
    }

    pub fn is_ready(&self, obj: &Object) -> Result<bool, FieldError> {
        match self.predicates.get(obj.kind()) {
            Some(p) => p(obj),
            None => Ok(true),
        }
    }
}

static BUILTIN: Lazy<Registry> = Lazy::new(Registry::with_builtin);

/// Shared registry of built-in predicates, resolved once.
pub fn builtin() -> &'static Registry {
    &BUILTIN
}

/// Evaluate `obj` against the built-in predicates.
pub fn is_ready(obj: &Object) -> Result<bool, FieldError> {
    BUILTIN.is_ready(obj)
}

// ---- shared helpers ----

/// `status.observedGeneration == metadata.generation`, both present.
pub(crate) fn generation_matches(obj: &Object) -> Result<bool, FieldError> {
    let Some(generation) = obj.nested_i64(&["metadata", "generation"])? else { return Ok(false) };
    let Some(observed) = obj.nested_i64(&["status", "observedGeneration"])? else { return Ok(false) };
    Ok(generation == observed)
}

/// Every path holds an integer and they are all equal.
pub(crate) fn all_equal(obj: &Object, paths: &[&[&str]]) -> Result<bool, FieldError> {
    let mut first: Option<i64> = None;
    for path in paths {
        let Some(v) = obj.nested_i64(path)? else { return Ok(false) };
        match first {
            None => first = Some(v),
            Some(f) if f != v => return Ok(false),
            Some(_) => {}
        }
    }
    Ok(true)
}

/// One entry of `status.conditions`; absent fields read as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Condition<'a> {
    pub kind: &'a str,
    pub status: &'a str,
    pub reason: &'a str,
}

fn condition_field<'a>(entry: &'a serde_json::Map<String, Json>, key: &str, idx: usize) -> Result<&'a str, FieldError> {
    match entry.get(key) {
        None | Some(Json::Null) => Ok(""),
        Some(Json::String(s)) => Ok(s.as_str()),
        Some(_) => Err(FieldError::WrongType {
            path: format!("status.conditions[{}].{}", idx, key),
            expected: "string",
            found: "non-string",
        }),
    }
}

/// `status.conditions`, `None` when absent.
pub(crate) fn conditions(obj: &Object) -> Result<Option<Vec<Condition<'_>>>, FieldError> {
    let Some(list) = obj.nested_slice(&["status", "conditions"])? else { return Ok(None) };
    let mut out = Vec::with_capacity(list.len());
    for (idx, entry) in list.iter().enumerate() {
        let Json::Object(entry) = entry else {
            return Err(FieldError::WrongType {
                path: format!("status.conditions[{}]", idx),
                expected: "map",
                found: "non-map",
            });
        };
        out.push(Condition {
            kind: condition_field(entry, "type", idx)?,
            status: condition_field(entry, "status", idx)?,
            reason: condition_field(entry, "reason", idx)?,
        });
    }
    Ok(Some(out))
}
