//! kdeploy orchestrator.
//!
//! Two phases over a [`ResourceSet`]:
//! - [`Deployer::prepare`] expands, labels and pins manifests without touching the cluster;
//! - [`Deployer::apply`] pushes them, polls readiness until converged or timed out and reports.
//!
//! All external effects go through the collaborator traits of `kdeploy-core`, so the whole
//! flow runs against scripted fakes in tests.

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kdeploy_core::collab::is_remote;
use kdeploy_core::{
    BlobTransfer, Clock, CloudContext, ClusterGateway, DeployError, EventSink, ImageResolver, SystemClock,
    TracingSink,
};
use kdeploy_store::{parse_configs, save_as_configs, ResourceSet};
use tracing::{debug, info};

mod apply;
pub mod links;
mod prepare;
pub mod templates;

pub use apply::{ApplyOptions, ClusterIdentity};
pub use prepare::{PrepareOptions, PrepareReport};

fn env_secs(var: &str, default: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// Delay between readiness polls (`KDEPLOY_POLL_SECS`, default 5s).
pub fn default_poll_interval() -> Duration {
    env_secs("KDEPLOY_POLL_SECS", 5)
}

/// Delay between "still waiting" reports (`KDEPLOY_STATUS_SECS`, default 30s).
pub fn default_status_interval() -> Duration {
    env_secs("KDEPLOY_STATUS_SECS", 30)
}

/// Runs Prepare and Apply against a fixed set of collaborators.
pub struct Deployer {
    gateway: Arc<dyn ClusterGateway>,
    cloud: Arc<dyn CloudContext>,
    transfer: Arc<dyn BlobTransfer>,
    resolver: Arc<dyn ImageResolver>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl Deployer {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        cloud: Arc<dyn CloudContext>,
        transfer: Arc<dyn BlobTransfer>,
        resolver: Arc<dyn ImageResolver>,
    ) -> Self {
        Self {
            gateway,
            cloud,
            transfer,
            resolver,
            events: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Parse manifests from a local path or a `gs://` location.
    async fn load(&self, location: &str, recursive: bool) -> Result<ResourceSet, DeployError> {
        if !is_remote(location) {
            return parse_configs(Path::new(location), recursive);
        }
        let tmp = tempfile::tempdir().map_err(|e| DeployError::io(std::env::temp_dir(), e))?;
        self.transfer
            .download(location, tmp.path(), recursive)
            .await
            .map_err(|source| DeployError::Transfer { context: format!("downloading {}", location), source })?;
        debug!(%location, dir = %tmp.path().display(), "downloaded manifests");
        parse_configs(tmp.path(), recursive)
    }

    /// Write `set` as one file per object to a local directory or a `gs://` location.
    async fn save(&self, set: &ResourceSet, location: &str) -> Result<(), DeployError> {
        if !is_remote(location) {
            save_as_configs(set, Path::new(location))?;
        } else {
            let tmp = tempfile::tempdir().map_err(|e| DeployError::io(std::env::temp_dir(), e))?;
            save_as_configs(set, tmp.path())?;
            self.transfer
                .upload(tmp.path(), location)
                .await
                .map_err(|source| DeployError::Transfer { context: format!("uploading to {}", location), source })?;
        }
        info!(%location, objects = set.len(), "configs saved");
        Ok(())
    }
}
