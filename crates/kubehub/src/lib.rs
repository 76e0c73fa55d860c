//! kdeploy kubehub: the production collaborators.
//!
//! [`KubeGateway`] talks to the API server directly (discovery + server-side apply);
//! the cloud side shells out to `gcloud` and `gsutil`.

#![forbid(unsafe_code)]

mod gateway;
mod gcloud;
mod gsutil;

pub use gateway::KubeGateway;
pub use gcloud::{GcloudContext, GcloudImageResolver};
pub use gsutil::GsutilTransfer;

/// Field manager recorded on server-side applies (`KDEPLOY_FIELD_MANAGER`, default `kdeploy`).
pub fn field_manager() -> String {
    std::env::var("KDEPLOY_FIELD_MANAGER")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| kdeploy_core::MANAGED_BY_VALUE.to_string())
}

pub(crate) mod process {
    use anyhow::{anyhow, Context, Result};
    use tokio::process::Command;
    use tracing::debug;

    /// Run `program args...` to completion and return its trimmed stdout.
    pub async fn run(program: &str, args: &[String]) -> Result<String> {
        debug!(%program, args = ?args, "exec");
        let out = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning {}", program))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(anyhow!(
                "{} {} failed ({}): {}",
                program,
                args.join(" "),
                out.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}
