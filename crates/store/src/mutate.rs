//! In-place edits applied while preparing manifests.

use kdeploy_core::{DeployError, EventSink, FieldError, ImageRef, Object};
use serde_json::Value as Json;
use tracing::debug;

use crate::workload::workload_paths;
use crate::ResourceSet;

fn shape_error(obj: &Object, e: FieldError) -> DeployError {
    DeployError::Validation(format!("{}: {}", obj.key(), e))
}

/// Set `key` in the string map at `path`; returns false when skipped because the key exists.
fn set_entry(
    obj: &mut Object,
    path: &[&str],
    key: &str,
    value: &str,
    overwrite: bool,
    sink: &dyn EventSink,
) -> Result<bool, FieldError> {
    let existing = obj.nested_map(path)?.and_then(|m| m.get(key)).cloned();
    if let Some(old) = existing {
        if !overwrite {
            if old.as_str() != Some(value) {
                sink.warn(format!(
                    "{}: not overriding existing label {}={} at {} with {:?}",
                    obj.key(),
                    key,
                    old.as_str().unwrap_or_default(),
                    path.join("."),
                    value
                ));
            }
            return Ok(false);
        }
    }
    let mut full = path.to_vec();
    full.push(key);
    obj.set_nested(&full, Json::String(value.to_string()));
    Ok(true)
}

/// Set a label on the object and, for workloads, on its pod template.
pub fn add_label(
    obj: &mut Object,
    key: &str,
    value: &str,
    overwrite: bool,
    sink: &dyn EventSink,
) -> Result<(), DeployError> {
    set_entry(obj, &["metadata", "labels"], key, value, overwrite, sink).map_err(|e| shape_error(obj, e))?;
    if let Some(paths) = workload_paths(obj.kind()) {
        set_entry(obj, paths.template_labels, key, value, overwrite, sink).map_err(|e| shape_error(obj, e))?;
    }
    Ok(())
}

/// Set `metadata.annotations[key]`, replacing any existing value.
pub fn add_annotation(obj: &mut Object, key: &str, value: &str) -> Result<(), DeployError> {
    obj.nested_map(&["metadata", "annotations"]).map_err(|e| shape_error(obj, e))?;
    obj.set_nested(&["metadata", "annotations", key], Json::String(value.to_string()));
    Ok(())
}

/// Rewrite every embedded namespace to `value`. Objects without one are left alone:
/// the namespace is chosen at apply time rather than baked into the configs.
pub fn update_namespace(set: &mut ResourceSet, value: &str, sink: &dyn EventSink) {
    for (file, obj) in set.iter_mut() {
        let Some(current) = obj.namespace().map(str::to_string) else { continue };
        if current == value {
            continue;
        }
        sink.warn(format!(
            "{}: replacing embedded namespace {:?} with {:?}; prefer leaving namespace out of configs",
            file, current, value
        ));
        obj.set_namespace(value);
    }
}

/// Replace the image of every workload container whose repository matches `image_name`
/// (tag and digest ignored). Returns whether anything was replaced.
pub fn update_matching_container_image(
    set: &mut ResourceSet,
    image_name: &str,
    replacement: &str,
    sink: &dyn EventSink,
) -> Result<bool, DeployError> {
    let mut found = false;
    for (file, obj) in set.iter_mut() {
        let Some(paths) = workload_paths(obj.kind()) else { continue };
        for list in ["containers", "initContainers"] {
            let mut path = paths.pod_spec.to_vec();
            path.push(list);
            if obj.nested_slice(&path).map_err(|e| shape_error(obj, e))?.is_none() {
                continue;
            }
            let Some(Json::Array(containers)) = obj.nested_mut(&path) else { continue };
            for c in containers.iter_mut() {
                let Some(image) = c.get("image").and_then(|v| v.as_str()) else { continue };
                if ImageRef::same_repository(image, image_name) {
                    debug!(file = %file, from = %image, to = %replacement, "container image replaced");
                    c["image"] = Json::String(replacement.to_string());
                    found = true;
                }
            }
        }
    }
    if !found {
        sink.warn(format!("no container image matching {} was found in any workload", image_name));
    }
    Ok(found)
}
