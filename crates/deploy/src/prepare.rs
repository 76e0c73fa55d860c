//! Prepare: expand, label and pin manifests, writing the suggested and expanded sets.

use std::collections::BTreeMap;

use kdeploy_application::{create_application_object, set_application_links, Link, APPLICATION_KIND};
use kdeploy_core::{
    DeployError, ImageRef, MANAGED_BY_LABEL, MANAGED_BY_VALUE, NAME_LABEL, RESERVED_LABELS, VERSION_LABEL,
};
use kdeploy_store::{add_annotation, add_label, update_matching_container_image, update_namespace, ResourceSet};
use tracing::{info, instrument};

use crate::{templates, Deployer};

#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    /// Image to deploy; synthesizes a Deployment when no manifests are given and is pinned by digest.
    pub image: Option<ImageRef>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    /// Local file or directory, or a `gs://` location.
    pub config: Option<String>,
    pub recursive: bool,
    pub suggested_output: String,
    pub expanded_output: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Port exposed through a LoadBalancer Service; 0 disables it.
    pub expose: u16,
    pub create_application: bool,
    pub application_links: Vec<Link>,
}

/// Outcome of a successful Prepare.
#[derive(Debug, Clone)]
pub struct PrepareReport {
    pub expanded: ResourceSet,
    /// `algorithm:hex` the image was pinned to.
    pub digest: Option<String>,
}

impl PrepareOptions {
    fn app(&self) -> Option<&str> {
        self.app_name.as_deref().filter(|s| !s.is_empty())
    }

    fn version(&self) -> Option<&str> {
        self.app_version.as_deref().filter(|s| !s.is_empty())
    }

    /// Checks that need no I/O.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.config.is_none() && self.image.is_none() {
            return Err(DeployError::Validation("a manifest source is required when no image is given".into()));
        }
        if let Some(key) = self.labels.keys().find(|k| RESERVED_LABELS.contains(&k.as_str())) {
            return Err(DeployError::Validation(format!("label {} is reserved and cannot be set as a custom label", key)));
        }
        if self.create_application && self.app().is_none() {
            return Err(DeployError::Validation("creating an Application requires an app name".into()));
        }
        if self.expose > 0 && self.app().is_none() {
            return Err(DeployError::Validation("exposing a port requires an app name".into()));
        }
        if matches!(self.namespace.as_deref(), Some(ns) if ns.trim().is_empty()) {
            return Err(DeployError::Validation("namespace must not be empty".into()));
        }
        Ok(())
    }
}

impl Deployer {
    #[instrument(skip_all, fields(app = ?opts.app_name, config = ?opts.config))]
    pub async fn prepare(&self, opts: &PrepareOptions) -> Result<PrepareReport, DeployError> {
        opts.validate()?;
        let sink = self.events.as_ref();

        let mut set = match &opts.config {
            Some(location) => {
                let set = self.load(location, opts.recursive).await?;
                if set.is_empty() && opts.image.is_none() {
                    return Err(DeployError::parse(location, "no objects found and no image given"));
                }
                set
            }
            None => ResourceSet::new(),
        };

        if let Some(image) = &opts.image {
            if set.is_empty() {
                let (deployment, hpa) = templates::deployment_and_hpa(image);
                info!(image = %image, deployment = %deployment.name(), "no manifests given; generating a deployment");
                set.add_object(deployment)?;
                set.add_object(hpa)?;
            }
            let name = image.name();
            update_matching_container_image(&mut set, &name, &name, sink)?;
        }

        if let Some(app) = opts.app().filter(|_| opts.expose > 0) {
            if !set.has_object("Service", &templates::service_name(app)) {
                set.add_object(templates::service(app, opts.expose))?;
            }
        }

        if let Some(app) = opts.app().filter(|_| opts.create_application) {
            if !set.has_object(APPLICATION_KIND, app) {
                let obj = create_application_object(
                    app,
                    NAME_LABEL,
                    app,
                    app,
                    opts.version().unwrap_or_default(),
                    set.objects(),
                );
                set.add_object(obj)?;
            }
        }

        if let Some(ns) = opts.namespace.as_deref().filter(|ns| *ns != "default") {
            if !set.has_object("Namespace", ns) {
                set.add_object(templates::namespace(ns))?;
            }
        }

        if let Some(app) = opts.app() {
            for obj in set.objects_mut().filter(|o| o.kind() != "Namespace") {
                add_label(obj, NAME_LABEL, app, false, sink)?;
            }
        }

        self.save(&set, &opts.suggested_output).await?;

        let mut digest = None;
        if let Some(image) = &opts.image {
            let resolved = self
                .resolver
                .resolve_digest(&image.to_string())
                .await
                .map_err(|e| DeployError::cluster(format!("resolving digest of {}", image), e))?;
            update_matching_container_image(&mut set, &image.name(), &image.pinned(&resolved), sink)?;
            digest = Some(resolved);
        }

        if let Some(ns) = opts.namespace.as_deref() {
            update_namespace(&mut set, ns, sink);
        }
        let target_ns = opts.namespace.as_deref().unwrap_or("default");
        for obj in set.objects_mut().filter(|o| o.kind() != "Namespace" && o.namespace().is_none()) {
            obj.set_namespace(target_ns);
        }

        for obj in set.objects_mut() {
            if obj.kind() != "Namespace" {
                if let Some(version) = opts.version() {
                    add_label(obj, VERSION_LABEL, version, false, sink)?;
                }
                add_label(obj, MANAGED_BY_LABEL, MANAGED_BY_VALUE, true, sink)?;
            }
            for (k, v) in &opts.labels {
                add_label(obj, k, v, true, sink)?;
            }
            for (k, v) in &opts.annotations {
                add_annotation(obj, k, v)?;
            }
            if obj.kind() == APPLICATION_KIND {
                set_application_links(obj, &opts.application_links)?;
            }
        }

        self.save(&set, &opts.expanded_output).await?;
        info!(objects = set.len(), digest = ?digest, "prepare finished");
        Ok(PrepareReport { expanded: set, digest })
    }
}
