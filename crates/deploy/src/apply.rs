//! Apply: push manifests to the cluster, wait for readiness, report.

use std::time::Duration;

use kdeploy_application::{APPLICATION_CRD, APPLICATION_KIND};
use kdeploy_core::{DeployError, GetFormat, Object};
use kdeploy_store::{decode, deploy_summary, encode, ResourceSet};
use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use crate::links::{console_links, ConsoleTarget};
use crate::{default_poll_interval, default_status_interval, Deployer};

const APPLICATION_CRD_MANIFEST: &str = include_str!("../assets/application-crd.yaml");

/// The GKE cluster to fetch credentials for before applying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub name: String,
    pub location: String,
    pub project: String,
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub cluster: Option<ClusterIdentity>,
    /// Local file or directory, or a `gs://` location.
    pub config: String,
    pub recursive: bool,
    /// Applied to every object instead of its own namespace.
    pub namespace: Option<String>,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub status_interval: Duration,
}

impl ApplyOptions {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            cluster: None,
            config: config.into(),
            recursive: false,
            namespace: None,
            wait_timeout: Duration::from_secs(300),
            poll_interval: default_poll_interval(),
            status_interval: default_status_interval(),
        }
    }

    fn namespace_for<'a>(&'a self, obj: &'a Object) -> Option<&'a str> {
        self.namespace.as_deref().filter(|s| !s.is_empty()).or(obj.namespace())
    }
}

fn cluster_error(what: &str, obj: &Object, e: anyhow::Error) -> DeployError {
    DeployError::cluster(format!("{} {}", what, obj.key()), e)
}

fn encode_for_apply(obj: &Object, origin: &str) -> Result<String, DeployError> {
    encode(obj).map_err(|source| DeployError::Decode { origin: origin.to_string(), source })
}

impl Deployer {
    #[instrument(skip_all, fields(config = %opts.config, ns = ?opts.namespace))]
    pub async fn apply(&self, opts: &ApplyOptions) -> Result<(), DeployError> {
        if let Some(c) = &opts.cluster {
            if let Err(e) = self.cloud.authorize_cluster_access(&c.name, &c.location, &c.project).await {
                if let Some(hint) = self.iam_hint(&c.project).await {
                    self.events.warn(hint);
                }
                return Err(DeployError::cluster(format!("getting credentials for cluster {}", c.name), e));
            }
        }

        let mut set = self.load(&opts.config, opts.recursive).await?;
        if set.is_empty() {
            return Err(DeployError::parse(&opts.config, "no objects to apply"));
        }
        for ((kind, name), files) in set.duplicates() {
            self.events.warn(format!(
                "{} {:?} is defined more than once ({}); the last applied wins",
                kind,
                name,
                files.join(", ")
            ));
        }

        for (file, ns) in set.take_kind("Namespace") {
            let exists = self
                .gateway
                .get(ns.api_version(), "Namespace", ns.name(), None, GetFormat::Yaml, true)
                .await
                .map_err(|e| cluster_error("checking", &ns, e))?;
            if !exists.trim().is_empty() {
                debug!(namespace = %ns.name(), "namespace exists");
                continue;
            }
            let manifest = encode_for_apply(&ns, &file)?;
            self.gateway.apply(&manifest, None).await.map_err(|e| cluster_error("applying", &ns, e))?;
            counter!("deploy_objects_applied_total", 1u64);
            self.events.progress(format!("Namespace {:?} created", ns.name()));
        }

        let mut crd_checked = false;
        for (file, obj) in set.iter() {
            if obj.kind() == APPLICATION_KIND && !crd_checked {
                self.ensure_application_crd().await?;
                crd_checked = true;
            }
            let manifest = encode_for_apply(obj, file)?;
            if let Err(e) = self.gateway.apply(&manifest, opts.namespace.as_deref()).await {
                counter!("deploy_apply_err_total", 1u64);
                return Err(cluster_error("applying", obj, e));
            }
            counter!("deploy_objects_applied_total", 1u64);
            info!(%file, object = %obj.key(), "applied");
        }

        if self.gateway.server_dry_run() {
            self.events.progress(format!("server dry run: {} object(s) validated, not waiting for readiness", set.len()));
            return Ok(());
        }

        let pending = self.wait_ready(&mut set, opts).await?;

        self.events.report(deploy_summary(&set));
        if let Some(project) = self.project(opts).await {
            let target = ConsoleTarget {
                project: &project,
                cluster: opts.cluster.as_ref().map(|c| (c.name.as_str(), c.location.as_str())),
            };
            self.events.report(console_links(target, set.objects(), opts.namespace.as_deref()));
        }

        if !pending.is_empty() {
            counter!("deploy_timeouts_total", 1u64);
            return Err(DeployError::Timeout { waited: opts.wait_timeout, pending });
        }
        Ok(())
    }

    /// Poll every pending object until all are ready or the deadline passes. Live copies
    /// replace the applied ones in `set`. Returns the keys still pending.
    async fn wait_ready(&self, set: &mut ResourceSet, opts: &ApplyOptions) -> Result<Vec<String>, DeployError> {
        let start = self.clock.now();
        let deadline = start + opts.wait_timeout;
        let mut last_status = start;
        let mut pending: Vec<String> = set.file_names().cloned().collect();

        loop {
            let mut still = Vec::new();
            for file in pending {
                let Some(obj) = set.get(&file) else { continue };
                let live = self.fetch(obj, opts).await?;
                let ready = kdeploy_readiness::is_ready(&live).map_err(|source| DeployError::Readiness {
                    kind: live.kind().to_string(),
                    name: live.name().to_string(),
                    source,
                })?;
                if ready {
                    let elapsed = self.clock.now().duration_since(start);
                    self.events.progress(format!("{} is ready after {:?}", live.key(), elapsed));
                } else {
                    still.push(file.clone());
                }
                set.replace(&file, live);
            }
            pending = still;
            if pending.is_empty() {
                break;
            }

            let now = self.clock.now();
            if now >= deadline {
                break;
            }
            if now.duration_since(last_status) >= opts.status_interval {
                let keys: Vec<String> = pending.iter().filter_map(|f| set.get(f)).map(Object::key).collect();
                self.events.progress(format!(
                    "still waiting on {} object(s) after {:?}: {}",
                    keys.len(),
                    now.duration_since(start),
                    keys.join(", ")
                ));
                last_status = now;
            }
            self.clock.sleep(opts.poll_interval.min(deadline - now)).await;
        }

        histogram!("deploy_rollout_seconds", self.clock.now().duration_since(start).as_secs_f64());
        if !pending.is_empty() {
            warn!(pending = pending.len(), timeout = ?opts.wait_timeout, "objects not ready before the deadline");
        }
        Ok(pending.iter().filter_map(|f| set.get(f)).map(Object::key).collect())
    }

    async fn fetch(&self, obj: &Object, opts: &ApplyOptions) -> Result<Object, DeployError> {
        let text = self
            .gateway
            .get(obj.api_version(), obj.kind(), obj.name(), opts.namespace_for(obj), GetFormat::Yaml, false)
            .await
            .map_err(|e| cluster_error("getting", obj, e))?;
        decode(text.as_bytes()).map_err(|source| DeployError::Decode { origin: format!("live {}", obj.key()), source })
    }

    /// Install the Application CRD unless the cluster already serves it.
    async fn ensure_application_crd(&self) -> Result<(), DeployError> {
        let existing = self
            .gateway
            .get("apiextensions.k8s.io/v1", "CustomResourceDefinition", APPLICATION_CRD, None, GetFormat::Yaml, true)
            .await
            .map_err(|e| DeployError::cluster(format!("checking CRD {}", APPLICATION_CRD), e))?;
        if !existing.trim().is_empty() {
            return Ok(());
        }
        self.gateway
            .apply(APPLICATION_CRD_MANIFEST, None)
            .await
            .map_err(|e| DeployError::cluster(format!("installing CRD {}", APPLICATION_CRD), e))?;
        self.events.progress(format!("installed CRD {}", APPLICATION_CRD));
        Ok(())
    }

    /// Remediation for a credentials failure; `None` when the account is unknown.
    async fn iam_hint(&self, project: &str) -> Option<String> {
        let account = self.cloud.get_config_value("account").await.ok()?;
        let account = account.trim();
        if account.is_empty() {
            return None;
        }
        Some(format!(
            "the active account may lack access to the cluster; grant it with:\n  \
             gcloud projects add-iam-policy-binding {} --member=serviceAccount:{} --role=roles/container.developer",
            project, account
        ))
    }

    async fn project(&self, opts: &ApplyOptions) -> Option<String> {
        if let Some(c) = &opts.cluster {
            return Some(c.project.clone());
        }
        match self.cloud.get_config_value("project").await {
            Ok(p) if !p.trim().is_empty() => Some(p.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "project unknown; skipping console links");
                None
            }
        }
    }
}
