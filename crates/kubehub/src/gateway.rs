//! Cluster gateway over kube-rs: discovery-resolved dynamic APIs and server-side apply.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use kdeploy_core::{ClusterGateway, GetFormat};
use kube::{
    api::{Api, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::{counter, histogram};
use serde_json::Value as Json;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// A manifest resolved to what the API server needs to address it.
#[derive(Debug)]
struct Target {
    json: Json,
    gvk: GroupVersionKind,
    name: String,
    ns: Option<String>,
}

fn parse_manifest(manifest: &str, ns_override: Option<&str>) -> Result<Target> {
    let val: serde_yaml::Value = serde_yaml::from_str(manifest).context("parsing YAML")?;
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    let api_version = json
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing apiVersion"))?
        .to_string();
    let kind = json
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing kind"))?
        .to_string();
    let gvk = gvk_of(&api_version, &kind);
    let name = json
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing metadata.name"))?
        .to_string();
    let ns = ns_override
        .map(str::to_string)
        .or_else(|| json.pointer("/metadata/namespace").and_then(|v| v.as_str()).map(str::to_string))
        .filter(|s| !s.is_empty());
    Ok(Target { json, gvk, name, ns })
}

fn gvk_of(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

fn set_namespace(v: &mut Json, ns: &str) {
    if let Some(root) = v.as_object_mut() {
        let meta = root.entry("metadata").or_insert_with(|| Json::Object(serde_json::Map::new()));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("namespace".into(), Json::String(ns.to_string()));
        }
    }
}

/// Render a live object as one document, without server bookkeeping.
fn render(obj: &DynamicObject, format: GetFormat) -> Result<String> {
    let mut raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    if let Some(meta) = raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
    }
    match format {
        GetFormat::Yaml => serde_yaml::to_string(&raw).context("rendering YAML"),
        GetFormat::Json => serde_json::to_string_pretty(&raw).context("rendering JSON"),
    }
}

/// Kind lookup without an apiVersion: the core group wins, then groups in name order.
fn find_by_kind(discovery: &Discovery, kind: &str) -> Option<(ApiResource, bool)> {
    let matches = discovery.groups().flat_map(|group| {
        group
            .recommended_resources()
            .into_iter()
            .filter(|(ar, _)| ar.kind.eq_ignore_ascii_case(kind))
            .map(|(ar, caps)| (ar, matches!(caps.scope, Scope::Namespaced)))
    });
    preferred(matches)
}

fn preferred(matches: impl IntoIterator<Item = (ApiResource, bool)>) -> Option<(ApiResource, bool)> {
    matches
        .into_iter()
        .min_by(|(a, _), (b, _)| (!a.group.is_empty(), &a.group).cmp(&(!b.group.is_empty(), &b.group)))
}

fn apply_error(kind: &str, name: &str, e: kube::Error) -> anyhow::Error {
    anyhow::Error::new(e).context(format!("server-side apply of {}/{}", kind, name))
}

fn find_by_gvk(discovery: &Discovery, gvk: &GroupVersionKind) -> Option<(ApiResource, bool)> {
    discovery
        .resolve_gvk(gvk)
        .map(|(ar, caps)| (ar, matches!(caps.scope, Scope::Namespaced)))
}

/// [`ClusterGateway`] backed by the current kubeconfig context.
///
/// The client and discovery are built on first use; discovery is re-run once when a kind is
/// not found, so CRDs installed during a run become addressable.
pub struct KubeGateway {
    field_manager: String,
    dry_run: bool,
    client: OnceCell<Client>,
    discovery: RwLock<Option<Arc<Discovery>>>,
}

impl Default for KubeGateway {
    fn default() -> Self {
        Self::with_field_manager(crate::field_manager())
    }
}

impl KubeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_manager(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            dry_run: false,
            client: OnceCell::new(),
            discovery: RwLock::new(None),
        }
    }

    /// Ask the server to validate applies without persisting them.
    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    async fn client(&self) -> Result<Client> {
        let client = self
            .client
            .get_or_try_init(|| async { Client::try_default().await.context("building kube client") })
            .await?;
        Ok(client.clone())
    }

    async fn discovery(&self, refresh: bool) -> Result<Arc<Discovery>> {
        if !refresh {
            if let Some(d) = self.discovery.read().await.as_ref() {
                return Ok(d.clone());
            }
        }
        let client = self.client().await?;
        let d = Arc::new(Discovery::new(client).run().await.context("running API discovery")?);
        *self.discovery.write().await = Some(d.clone());
        Ok(d)
    }

    async fn resolve<F>(&self, lookup: F) -> Result<Option<(ApiResource, bool)>>
    where
        F: Fn(&Discovery) -> Option<(ApiResource, bool)>,
    {
        for refresh in [false, true] {
            let d = self.discovery(refresh).await?;
            if let Some(found) = lookup(&d) {
                return Ok(Some(found));
            }
            debug!(refresh, "resource not in discovery");
        }
        Ok(None)
    }

    fn api(client: Client, ar: &ApiResource, namespaced: bool, ns: Option<&str>) -> Api<DynamicObject> {
        if namespaced {
            Api::namespaced_with(client, ns.unwrap_or("default"), ar)
        } else {
            Api::all_with(client, ar)
        }
    }
}

#[async_trait::async_trait]
impl ClusterGateway for KubeGateway {
    async fn apply(&self, manifest: &str, namespace: Option<&str>) -> Result<()> {
        let t0 = Instant::now();
        let mut target = parse_manifest(manifest, namespace)?;
        let gvk = target.gvk.clone();
        let (ar, namespaced) = self.resolve(|d| find_by_gvk(d, &gvk)).await?.ok_or_else(|| {
            anyhow!("kind not served by cluster: {}/{}/{}", gvk.group, gvk.version, gvk.kind)
        })?;
        if namespaced {
            let ns = target.ns.get_or_insert_with(|| "default".to_string());
            set_namespace(&mut target.json, ns);
        } else if let Some(meta) = target.json.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.remove("namespace");
        }
        let api = Self::api(self.client().await?, &ar, namespaced, target.ns.as_deref());

        let mut pp = PatchParams::apply(&self.field_manager).force();
        if self.dry_run {
            pp = pp.dry_run();
        }
        if let Err(e) = api.patch(&target.name, &pp, &Patch::Apply(&target.json)).await {
            counter!("gateway_apply_err", 1u64);
            return Err(apply_error(&gvk.kind, &target.name, e));
        }
        histogram!("gateway_apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(kind = %gvk.kind, name = %target.name, ns = ?target.ns, dry_run = self.dry_run, "applied");
        Ok(())
    }

    async fn get(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        format: GetFormat,
        ignore_not_found: bool,
    ) -> Result<String> {
        let found = if api_version.is_empty() {
            self.resolve(|d| find_by_kind(d, kind)).await?
        } else {
            let gvk = gvk_of(api_version, kind);
            self.resolve(|d| find_by_gvk(d, &gvk)).await?
        };
        let Some((ar, namespaced)) = found else {
            if ignore_not_found {
                return Ok(String::new());
            }
            return Err(anyhow!("kind not served by cluster: {} {}", api_version, kind));
        };
        let api = Self::api(self.client().await?, &ar, namespaced, namespace);
        match api.get_opt(name).await.with_context(|| format!("getting {}/{}", kind, name))? {
            Some(obj) => render(&obj, format),
            None if ignore_not_found => Ok(String::new()),
            None => Err(anyhow!("{}/{} not found", kind, name)),
        }
    }

    fn server_dry_run(&self) -> bool {
        self.dry_run
    }
}
