//! Capabilities the orchestrator consumes but does not implement.
//!
//! Implementations live in `kdeploy-kubehub`; tests script their own.

use anyhow::Result;
use std::path::Path;

/// Output format for [`ClusterGateway::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetFormat {
    #[default]
    Yaml,
    Json,
}

/// Cluster access: push manifests and read back live objects.
#[async_trait::async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Apply one YAML manifest. `namespace` overrides the manifest's own namespace.
    async fn apply(&self, manifest: &str, namespace: Option<&str>) -> Result<()>;

    /// Fetch one live object rendered as a single document.
    /// `api_version` selects the group when several serve the same kind; empty means any.
    /// Returns an empty string when `ignore_not_found` is set and the object is absent.
    async fn get(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        format: GetFormat,
        ignore_not_found: bool,
    ) -> Result<String>;

    /// Applies are validated by the server but not persisted.
    fn server_dry_run(&self) -> bool {
        false
    }
}

/// Cloud account and cluster credential handling.
#[async_trait::async_trait]
pub trait CloudContext: Send + Sync {
    /// Make the named cluster the current context and fetch credentials for it.
    async fn authorize_cluster_access(&self, name: &str, location: &str, project: &str) -> Result<()>;

    /// Read a configuration value such as `project` or `account`.
    async fn get_config_value(&self, key: &str) -> Result<String>;
}

/// Copying manifest trees to and from object storage. Retries are the implementation's concern.
#[async_trait::async_trait]
pub trait BlobTransfer: Send + Sync {
    async fn download(&self, src: &str, dst: &Path, recursive: bool) -> Result<()>;
    async fn upload(&self, src: &Path, dst: &str) -> Result<()>;
}

/// Tag to content-digest resolution.
#[async_trait::async_trait]
pub trait ImageResolver: Send + Sync {
    /// Returns `algorithm:hex`, e.g. `sha256:...`.
    async fn resolve_digest(&self, image: &str) -> Result<String>;
}

/// Whether a manifest location refers to object storage rather than the local filesystem.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("gs://")
}
