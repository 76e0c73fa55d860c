#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use kdeploy_core::{
    BlobTransfer, CloudContext, ClusterGateway, GetFormat, ImageResolver, ManualClock, MemorySink,
};
use kdeploy_deploy::Deployer;
use serde_json::{json, Value as Json};

/// Cluster that records applies and answers gets from a per-object script.
#[derive(Default)]
pub struct ScriptedGateway {
    pub applied: Mutex<Vec<(String, Option<String>)>>,
    gets: Mutex<HashMap<String, usize>>,
    /// `Kind/name` -> number of gets after which the object reports ready.
    ready_after: HashMap<String, usize>,
    existing: Vec<String>,
    /// Live copies with a string where status counters should be integers.
    malformed: Vec<String>,
    failing_gets: Vec<String>,
    /// `apiVersion Kind/name` of every get, in order.
    pub requested: Mutex<Vec<String>>,
    pub dry_run: bool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready_after(mut self, key: &str, gets: usize) -> Self {
        self.ready_after.insert(key.to_string(), gets);
        self
    }

    pub fn existing(mut self, key: &str) -> Self {
        self.existing.push(key.to_string());
        self
    }

    pub fn malformed(mut self, key: &str) -> Self {
        self.malformed.push(key.to_string());
        self
    }

    pub fn failing_get(mut self, key: &str) -> Self {
        self.failing_gets.push(key.to_string());
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// `Kind/name` of every applied manifest, in order.
    pub fn applied_keys(&self) -> Vec<String> {
        self.applied.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn gets_for(&self, key: &str) -> usize {
        self.gets.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn live(&self, kind: &str, name: &str, ready: bool) -> Json {
        match kind {
            "Deployment" => deployment_status(name, ready),
            "Service" => json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": name },
                "spec": { "type": "ClusterIP", "clusterIP": "10.0.0.9" }
            }),
            _ => json!({ "apiVersion": "v1", "kind": kind, "metadata": { "name": name } }),
        }
    }
}

pub fn deployment_status(name: &str, ready: bool) -> Json {
    let available = if ready { 2 } else { 1 };
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": "default", "generation": 1 },
        "spec": { "replicas": 2 },
        "status": {
            "observedGeneration": 1,
            "replicas": 2,
            "readyReplicas": available,
            "availableReplicas": available,
            "conditions": [ { "type": "Available", "status": if ready { "True" } else { "False" } } ]
        }
    })
}

#[async_trait::async_trait]
impl ClusterGateway for ScriptedGateway {
    async fn apply(&self, manifest: &str, namespace: Option<&str>) -> Result<()> {
        let v: serde_yaml::Value = serde_yaml::from_str(manifest)?;
        let kind = v["kind"].as_str().ok_or_else(|| anyhow!("no kind"))?;
        let name = v["metadata"]["name"].as_str().ok_or_else(|| anyhow!("no name"))?;
        if name == "rejected" {
            return Err(anyhow!("admission webhook denied the request"));
        }
        self.applied
            .lock()
            .unwrap()
            .push((format!("{}/{}", kind, name), namespace.map(str::to_string)));
        Ok(())
    }

    async fn get(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        _namespace: Option<&str>,
        _format: GetFormat,
        ignore_not_found: bool,
    ) -> Result<String> {
        let key = format!("{}/{}", kind, name);
        self.requested.lock().unwrap().push(format!("{} {}", api_version, key));
        if self.failing_gets.contains(&key) {
            return Err(anyhow!("connection refused"));
        }
        if ignore_not_found {
            let present = self.existing.contains(&key) || self.applied_keys().contains(&key);
            if !present {
                return Ok(String::new());
            }
        }
        let n = {
            let mut gets = self.gets.lock().unwrap();
            let n = gets.entry(key.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let ready = self.ready_after.get(&key).map(|after| n >= *after).unwrap_or(true);
        let mut live = self.live(kind, name, ready);
        if self.malformed.contains(&key) {
            live["status"]["replicas"] = json!("3");
        }
        Ok(serde_yaml::to_string(&live)?)
    }

    fn server_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[derive(Default)]
pub struct FakeCloud {
    pub project: Option<String>,
    pub account: Option<String>,
    pub deny_access: bool,
    pub authorized: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl CloudContext for FakeCloud {
    async fn authorize_cluster_access(&self, name: &str, location: &str, project: &str) -> Result<()> {
        if self.deny_access {
            return Err(anyhow!("PERMISSION_DENIED: container.clusters.get"));
        }
        self.authorized.lock().unwrap().push(format!("{}/{}/{}", project, location, name));
        Ok(())
    }

    async fn get_config_value(&self, key: &str) -> Result<String> {
        let v = match key {
            "project" => self.project.clone(),
            "account" => self.account.clone(),
            _ => None,
        };
        v.ok_or_else(|| anyhow!("(unset) {}", key))
    }
}

/// Object storage backed by a local directory standing in for the bucket.
pub struct FakeTransfer {
    pub bucket: PathBuf,
    pub uploads: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeTransfer {
    pub fn new(bucket: &Path) -> Self {
        Self { bucket: bucket.to_path_buf(), uploads: Mutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl BlobTransfer for FakeTransfer {
    async fn download(&self, src: &str, dst: &Path, _recursive: bool) -> Result<()> {
        let rel = src.trim_start_matches("gs://").trim_end_matches('/');
        let from = self.bucket.join(rel);
        for entry in std::fs::read_dir(&from)? {
            let entry = entry?;
            std::fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
        Ok(())
    }

    async fn upload(&self, src: &Path, dst: &str) -> Result<()> {
        let mut files: Vec<String> = std::fs::read_dir(src)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        self.uploads.lock().unwrap().push((dst.to_string(), files));
        Ok(())
    }
}

pub struct FixedResolver(pub &'static str);

#[async_trait::async_trait]
impl ImageResolver for FixedResolver {
    async fn resolve_digest(&self, _image: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub const DIGEST: &str = "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

pub struct Harness {
    pub gateway: Arc<ScriptedGateway>,
    pub cloud: Arc<FakeCloud>,
    pub transfer: Arc<FakeTransfer>,
    pub events: Arc<MemorySink>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(gateway: ScriptedGateway, cloud: FakeCloud, bucket: &Path) -> Self {
        Self {
            gateway: Arc::new(gateway),
            cloud: Arc::new(cloud),
            transfer: Arc::new(FakeTransfer::new(bucket)),
            events: Arc::new(MemorySink::new()),
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub fn deployer(&self) -> Deployer {
        Deployer::new(
            self.gateway.clone(),
            self.cloud.clone(),
            self.transfer.clone(),
            Arc::new(FixedResolver(DIGEST)),
        )
        .with_events(self.events.clone())
        .with_clock(self.clock.clone())
    }
}

pub const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
      - name: web
        image: gcr.io/acme/web:v1
";
