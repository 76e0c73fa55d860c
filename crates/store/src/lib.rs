//! kdeploy resource store: decoding and encoding manifests, collision-free file naming,
//! in-place mutations and the deploy summary table.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use kdeploy_core::{DeployError, Object};

pub mod codec;
pub mod configs;
pub mod mutate;
pub mod summary;
pub mod workload;

pub use codec::{decode, encode, split_documents};
pub use configs::{parse_configs, save_as_configs};
pub use mutate::{add_annotation, add_label, update_matching_container_image, update_namespace};
pub use summary::deploy_summary;
pub use workload::{workload_paths, WorkloadPaths};

/// Upper bound on `-N` suffixes tried when resolving a file name collision.
pub const MAX_NAME_ATTEMPTS: usize = 1000;

/// Objects keyed by a generated file name that is unique within the set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    objects: BTreeMap<String, Object>,
}

/// `deploy.yaml` -> (`deploy`, `.yaml`); names without an extension keep an empty suffix.
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, file: &str) -> Option<&Object> {
        self.objects.get(file)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Object)> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Object)> {
        self.objects.iter_mut()
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.objects.values_mut()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &String> {
        self.objects.keys()
    }

    /// Replace the object stored under an existing file name.
    pub fn replace(&mut self, file: &str, obj: Object) -> Option<Object> {
        self.objects.get_mut(file).map(|slot| std::mem::replace(slot, obj))
    }

    /// Insert under `suggested`, or `<stem>-N<ext>` for the first free `N >= 2`.
    pub fn insert_named(&mut self, suggested: &str, obj: Object) -> Result<String, DeployError> {
        let name = self.free_name(&[suggested.to_string()], suggested)?;
        self.objects.insert(name.clone(), obj);
        Ok(name)
    }

    /// Insert with the default naming scheme: `<kind>.yaml`, then `<kind>-<name>.yaml`,
    /// then `<kind>-<name>-N.yaml`.
    pub fn add_object(&mut self, obj: Object) -> Result<String, DeployError> {
        let kind = obj.kind().to_lowercase();
        let by_kind = format!("{}.yaml", kind);
        let by_name = format!("{}-{}.yaml", kind, obj.name());
        let name = self.free_name(&[by_kind, by_name.clone()], &by_name)?;
        self.objects.insert(name.clone(), obj);
        Ok(name)
    }

    fn free_name(&self, candidates: &[String], suffix_base: &str) -> Result<String, DeployError> {
        if let Some(free) = candidates.iter().find(|c| !self.objects.contains_key(*c)) {
            return Ok(free.clone());
        }
        let (stem, ext) = split_ext(suffix_base);
        (2..MAX_NAME_ATTEMPTS + 2)
            .map(|n| format!("{}-{}{}", stem, n, ext))
            .find(|c| !self.objects.contains_key(c))
            .ok_or_else(|| {
                DeployError::Naming(format!(
                    "no free file name for {:?} after {} attempts",
                    suffix_base, MAX_NAME_ATTEMPTS
                ))
            })
    }

    pub fn has_object(&self, kind: &str, name: &str) -> bool {
        self.objects.values().any(|o| o.kind() == kind && o.name() == name)
    }

    /// Remove and return every object of `kind`, in file-name order.
    pub fn take_kind(&mut self, kind: &str) -> Vec<(String, Object)> {
        let keys: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, o)| o.kind() == kind)
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| self.objects.remove(&k).map(|o| (k, o)))
            .collect()
    }

    /// `(kind, name)` pairs that appear more than once, with their file names.
    pub fn duplicates(&self) -> Vec<((String, String), Vec<String>)> {
        let mut seen: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for (file, o) in &self.objects {
            seen.entry((o.kind().to_string(), o.name().to_string())).or_default().push(file.clone());
        }
        seen.into_iter().filter(|(_, files)| files.len() > 1).collect()
    }
}

impl IntoIterator for ResourceSet {
    type Item = (String, Object);
    type IntoIter = std::collections::btree_map::IntoIter<String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str) -> Object {
        Object::new("v1", "Service", name)
    }

    #[test]
    fn default_naming_resolves_collisions_deterministically() {
        let mut set = ResourceSet::new();
        assert_eq!(set.add_object(svc("web")).unwrap(), "service.yaml");
        assert_eq!(set.add_object(svc("web")).unwrap(), "service-web.yaml");
        assert_eq!(set.add_object(svc("web")).unwrap(), "service-web-2.yaml");
        assert_eq!(set.add_object(svc("web")).unwrap(), "service-web-3.yaml");
        assert_eq!(set.add_object(svc("api")).unwrap(), "service-api.yaml");
        assert!(set.has_object("Service", "api"));
        assert!(!set.has_object("Deployment", "api"));
    }

    #[test]
    fn insert_named_suffixes_before_extension() {
        let mut set = ResourceSet::new();
        assert_eq!(set.insert_named("app.yaml", svc("a")).unwrap(), "app.yaml");
        assert_eq!(set.insert_named("app.yaml", svc("b")).unwrap(), "app-2.yaml");
        assert_eq!(set.insert_named("app.yaml", svc("c")).unwrap(), "app-3.yaml");
        assert_eq!(set.insert_named("noext", svc("d")).unwrap(), "noext");
        assert_eq!(set.insert_named("noext", svc("e")).unwrap(), "noext-2");
    }

    #[test]
    fn take_kind_and_duplicates() {
        let mut set = ResourceSet::new();
        set.add_object(Object::new("v1", "Namespace", "prod")).unwrap();
        set.add_object(svc("web")).unwrap();
        set.add_object(svc("web")).unwrap();
        let dups = set.duplicates();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].0, ("Service".to_string(), "web".to_string()));
        assert_eq!(dups[0].1, vec!["service-web.yaml", "service.yaml"]);

        let ns = set.take_kind("Namespace");
        assert_eq!(ns.len(), 1);
        assert_eq!(ns[0].0, "namespace.yaml");
        assert_eq!(set.len(), 2);
    }
}
