//! `gsutil`-backed transfers between Cloud Storage and local directories.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use kdeploy_core::BlobTransfer;
use tracing::info;

use crate::process;

fn is_manifest(url: &str) -> bool {
    url.ends_with(".yaml") || url.ends_with(".yml")
}

/// A single manifest is copied as is; a prefix contributes its objects (`-r` for nested ones).
fn download_args(src: &str, dst: &Path, recursive: bool) -> Vec<String> {
    let mut args = vec!["-m".to_string(), "cp".to_string()];
    if is_manifest(src) {
        args.push(src.to_string());
    } else {
        if recursive {
            args.push("-r".into());
        }
        args.push(format!("{}/*", src.trim_end_matches('/')));
    }
    args.push(dst.display().to_string());
    args
}

fn upload_args(files: &[PathBuf], dst: &str) -> Vec<String> {
    let mut args = vec!["-m".to_string(), "cp".to_string()];
    args.extend(files.iter().map(|f| f.display().to_string()));
    args.push(format!("{}/", dst.trim_end_matches('/')));
    args
}

/// [`BlobTransfer`] using the local `gsutil` installation. Retries are left to `gsutil`.
#[derive(Debug, Clone)]
pub struct GsutilTransfer {
    binary: String,
}

impl Default for GsutilTransfer {
    fn default() -> Self {
        Self { binary: "gsutil".into() }
    }
}

impl GsutilTransfer {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait::async_trait]
impl BlobTransfer for GsutilTransfer {
    async fn download(&self, src: &str, dst: &Path, recursive: bool) -> Result<()> {
        process::run(&self.binary, &download_args(src, dst, recursive))
            .await
            .with_context(|| format!("downloading {}", src))?;
        info!(%src, dst = %dst.display(), recursive, "downloaded");
        Ok(())
    }

    async fn upload(&self, src: &Path, dst: &str) -> Result<()> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(src)
            .await
            .with_context(|| format!("listing {}", src.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        if files.is_empty() {
            return Err(anyhow!("nothing to upload in {}", src.display()));
        }
        files.sort();
        process::run(&self.binary, &upload_args(&files, dst))
            .await
            .with_context(|| format!("uploading {} to {}", src.display(), dst))?;
        info!(src = %src.display(), %dst, files = files.len(), "uploaded");
        Ok(())
    }
}
