//! kdeploy Application aggregate.
//!
//! Builds the `app.k8s.io` Application custom resource that groups the component kinds of a
//! deployed app under one selector, and attaches descriptor links to it.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use kdeploy_core::{DeployError, Object};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub const APPLICATION_API_VERSION: &str = "app.k8s.io/v1beta1";
pub const APPLICATION_KIND: &str = "Application";
/// Name of the CustomResourceDefinition that serves [`APPLICATION_KIND`].
pub const APPLICATION_CRD: &str = "applications.app.k8s.io";

/// One entry of `spec.descriptor.links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub description: String,
    pub url: String,
}

impl Link {
    pub fn new(description: impl Into<String>, url: impl Into<String>) -> Self {
        Self { description: description.into(), url: url.into() }
    }
}

/// Build an Application whose `componentKinds` cover every component except namespaces and
/// other Applications, deduplicated and sorted by `(group, kind)`.
pub fn create_application_object<'a>(
    name: &str,
    selector_key: &str,
    selector_value: &str,
    descriptor_type: &str,
    descriptor_version: &str,
    components: impl IntoIterator<Item = &'a Object>,
) -> Object {
    let kinds: BTreeSet<(&str, &str)> = components
        .into_iter()
        .filter(|o| o.kind() != "Namespace" && o.kind() != APPLICATION_KIND)
        .map(|o| (o.group(), o.kind()))
        .collect();
    debug!(app = %name, kinds = kinds.len(), "building application object");

    let component_kinds: Vec<_> = kinds
        .iter()
        .map(|(group, kind)| json!({ "group": group, "kind": kind }))
        .collect();

    let mut app = Object::new(APPLICATION_API_VERSION, APPLICATION_KIND, name);
    let mut match_labels = serde_json::Map::new();
    match_labels.insert(selector_key.to_string(), json!(selector_value));
    app.set_nested(&["spec", "selector", "matchLabels"], match_labels.into());
    app.set_nested(&["spec", "componentKinds"], json!(component_kinds));
    app.set_nested(
        &["spec", "descriptor"],
        json!({ "type": descriptor_type, "version": descriptor_version }),
    );
    app
}

/// Replace `spec.descriptor.links`; an empty slice leaves the object untouched.
pub fn set_application_links(obj: &mut Object, links: &[Link]) -> Result<(), DeployError> {
    if obj.kind() != APPLICATION_KIND {
        return Err(DeployError::Validation(format!(
            "cannot set application links on {}: not an {}",
            obj.key(),
            APPLICATION_KIND
        )));
    }
    if links.is_empty() {
        return Ok(());
    }
    let links = links
        .iter()
        .map(|l| json!({ "description": l.description, "url": l.url }))
        .collect::<Vec<_>>();
    obj.set_nested(&["spec", "descriptor", "links"], json!(links));
    Ok(())
}
