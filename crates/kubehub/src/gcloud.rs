//! `gcloud`-backed cloud context and image digest resolution.

use anyhow::{anyhow, Context, Result};
use kdeploy_core::{CloudContext, ImageResolver};
use tracing::info;

use crate::process;

fn credentials_args(name: &str, location: &str, project: &str) -> Vec<String> {
    vec![
        "container".into(),
        "clusters".into(),
        "get-credentials".into(),
        name.into(),
        format!("--location={}", location),
        format!("--project={}", project),
        "--quiet".into(),
    ]
}

fn describe_args(image: &str) -> Vec<String> {
    vec![
        "container".into(),
        "images".into(),
        "describe".into(),
        image.into(),
        "--format=value(image_summary.digest)".into(),
    ]
}

/// Accepts `algorithm:hex` output only.
fn check_digest(image: &str, out: &str) -> Result<String> {
    match out.split_once(':') {
        Some((alg, hex)) if !alg.is_empty() && !hex.is_empty() && !out.contains(char::is_whitespace) => {
            Ok(out.to_string())
        }
        _ => Err(anyhow!("unexpected digest for {}: {:?}", image, out)),
    }
}

/// [`CloudContext`] using the local `gcloud` installation and its active account.
#[derive(Debug, Clone)]
pub struct GcloudContext {
    binary: String,
}

impl Default for GcloudContext {
    fn default() -> Self {
        Self { binary: "gcloud".into() }
    }
}

impl GcloudContext {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait::async_trait]
impl CloudContext for GcloudContext {
    async fn authorize_cluster_access(&self, name: &str, location: &str, project: &str) -> Result<()> {
        process::run(&self.binary, &credentials_args(name, location, project))
            .await
            .with_context(|| format!("fetching credentials for cluster {} in {}", name, location))?;
        info!(cluster = %name, %location, %project, "cluster credentials configured");
        Ok(())
    }

    async fn get_config_value(&self, key: &str) -> Result<String> {
        let args = vec!["config".to_string(), "get-value".to_string(), key.to_string()];
        process::run(&self.binary, &args)
            .await
            .with_context(|| format!("reading gcloud config value {}", key))
    }
}

/// [`ImageResolver`] using `gcloud container images describe`.
#[derive(Debug, Clone)]
pub struct GcloudImageResolver {
    binary: String,
}

impl Default for GcloudImageResolver {
    fn default() -> Self {
        Self { binary: "gcloud".into() }
    }
}

impl GcloudImageResolver {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait::async_trait]
impl ImageResolver for GcloudImageResolver {
    async fn resolve_digest(&self, image: &str) -> Result<String> {
        let out = process::run(&self.binary, &describe_args(image))
            .await
            .with_context(|| format!("resolving digest of {}", image))?;
        check_digest(image, &out)
    }
}
