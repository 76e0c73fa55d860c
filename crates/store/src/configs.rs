//! Reading manifest files and directories, and writing one-object-per-file trees.

use std::path::Path;

use kdeploy_core::DeployError;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::codec::{decode, encode, split_documents};
use crate::ResourceSet;

fn is_manifest(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
}

/// Decode every document of `path` into `set`. The first object keeps the file name,
/// later ones are named `<stem>-<kind>-<name>.<ext>`.
fn parse_file(path: &Path, set: &mut ResourceSet) -> Result<(), DeployError> {
    let text = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DeployError::parse(path, "file name is not valid UTF-8"))?;
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, e),
        _ => (file_name, "yaml"),
    };
    for (i, doc) in split_documents(&text).iter().enumerate() {
        let obj = decode(doc.as_bytes()).map_err(|source| DeployError::Decode {
            origin: format!("{} (document {})", path.display(), i + 1),
            source,
        })?;
        let suggested = if i == 0 {
            file_name.to_string()
        } else {
            format!("{}-{}-{}.{}", stem, obj.kind().to_lowercase(), obj.name(), ext)
        };
        let stored = set.insert_named(&suggested, obj)?;
        debug!(path = %path.display(), file = %stored, "decoded manifest");
    }
    Ok(())
}

/// Parse a manifest file, or every `.yaml`/`.yml` file in a directory
/// (descending into subdirectories only when `recursive`).
pub fn parse_configs(path: &Path, recursive: bool) -> Result<ResourceSet, DeployError> {
    let meta = std::fs::metadata(path).map_err(|e| DeployError::io(path, e))?;
    let mut set = ResourceSet::new();
    if meta.is_file() {
        parse_file(path, &mut set)?;
        return Ok(set);
    }
    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();
    let mut files = 0usize;
    for entry in walker {
        let entry = entry.map_err(|e| DeployError::parse(path, e.to_string()))?;
        if !entry.file_type().is_file() || !is_manifest(entry.path()) {
            continue;
        }
        files += 1;
        parse_file(entry.path(), &mut set)?;
    }
    if files == 0 {
        return Err(DeployError::parse(path, "no .yaml or .yml files found"));
    }
    info!(path = %path.display(), files, objects = set.len(), "parsed configs");
    Ok(set)
}

/// Write one file per object into `dir`, which must be absent or an empty directory.
pub fn save_as_configs(set: &ResourceSet, dir: &Path) -> Result<(), DeployError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(DeployError::parse(dir, "output path exists and is not a directory"));
        }
        let mut entries = std::fs::read_dir(dir).map_err(|e| DeployError::io(dir, e))?;
        if entries.next().is_some() {
            return Err(DeployError::parse(dir, "output directory exists and is not empty"));
        }
    }
    std::fs::create_dir_all(dir).map_err(|e| DeployError::io(dir, e))?;
    for (file, obj) in set.iter() {
        let yaml = encode(obj).map_err(|source| DeployError::Decode { origin: file.clone(), source })?;
        let out = dir.join(file);
        std::fs::write(&out, yaml).map_err(|e| DeployError::io(&out, e))?;
    }
    info!(dir = %dir.display(), objects = set.len(), "saved configs");
    Ok(())
}
