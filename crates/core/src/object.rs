//! Resource objects: a thin wrapper over a JSON tree with typed nested accessors.
//!
//! Accessors distinguish three outcomes the way readiness checks need them:
//! `Ok(Some(v))` present, `Ok(None)` absent, `Err(FieldError)` present with the wrong shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{CodecError, FieldError};

/// One decoded Kubernetes manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Json);

fn type_name(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "sequence",
        Json::Object(_) => "map",
    }
}

fn wrong(path: &[&str], expected: &'static str, found: &Json) -> FieldError {
    FieldError::WrongType { path: path.join("."), expected, found: type_name(found) }
}

impl Object {
    /// Wrap a JSON tree, requiring a mapping with a non-empty `kind`.
    pub fn from_value(v: Json) -> Result<Self, CodecError> {
        let kind = match &v {
            Json::Object(map) => map.get("kind").and_then(|k| k.as_str()).unwrap_or(""),
            Json::Null => return Err(CodecError::Empty),
            _ => return Err(CodecError::NotAMapping),
        };
        if kind.is_empty() {
            return Err(CodecError::MissingKind);
        }
        Ok(Self(v))
    }

    /// Minimal object with `apiVersion`, `kind` and `metadata.name`.
    pub fn new(api_version: &str, kind: &str, name: &str) -> Self {
        Self(serde_json::json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": name },
        }))
    }

    pub fn as_value(&self) -> &Json {
        &self.0
    }

    pub fn value_mut(&mut self) -> &mut Json {
        &mut self.0
    }

    pub fn into_value(self) -> Json {
        self.0
    }

    fn top_str(&self, key: &str) -> &str {
        self.0.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    fn meta_str(&self, key: &str) -> &str {
        self.0
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn kind(&self) -> &str {
        self.top_str("kind")
    }

    pub fn api_version(&self) -> &str {
        self.top_str("apiVersion")
    }

    pub fn name(&self) -> &str {
        self.meta_str("name")
    }

    /// Namespace, or `None` when absent or empty.
    pub fn namespace(&self) -> Option<&str> {
        Some(self.meta_str("namespace")).filter(|s| !s.is_empty())
    }

    /// API group; `core` for the legacy group (apiVersion without a `/`).
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((g, _)) => g,
            None => "core",
        }
    }

    /// `Kind/name`, used in logs and error context.
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    pub fn set_namespace(&mut self, ns: &str) {
        self.set_nested(&["metadata", "namespace"], Json::String(ns.to_string()));
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(key))
            .and_then(|v| v.as_str())
    }

    /// Walk `path` through nested maps.
    pub fn nested(&self, path: &[&str]) -> Result<Option<&Json>, FieldError> {
        let mut cur = &self.0;
        for (i, seg) in path.iter().enumerate() {
            match cur {
                Json::Object(map) => match map.get(*seg) {
                    Some(next) => cur = next,
                    None => return Ok(None),
                },
                other => return Err(wrong(&path[..i], "map", other)),
            }
        }
        Ok(Some(cur))
    }

    pub fn nested_str(&self, path: &[&str]) -> Result<Option<&str>, FieldError> {
        match self.nested(path)? {
            None | Some(Json::Null) => Ok(None),
            Some(Json::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(wrong(path, "string", other)),
        }
    }

    pub fn nested_i64(&self, path: &[&str]) -> Result<Option<i64>, FieldError> {
        match self.nested(path)? {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Number(n)) => n.as_i64().map(Some).ok_or_else(|| FieldError::WrongType {
                path: path.join("."),
                expected: "integer",
                found: "number",
            }),
            Some(other) => Err(wrong(path, "integer", other)),
        }
    }

    pub fn nested_slice(&self, path: &[&str]) -> Result<Option<&[Json]>, FieldError> {
        match self.nested(path)? {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Array(a)) => Ok(Some(a.as_slice())),
            Some(other) => Err(wrong(path, "sequence", other)),
        }
    }

    pub fn nested_map(&self, path: &[&str]) -> Result<Option<&Map<String, Json>>, FieldError> {
        match self.nested(path)? {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Object(m)) => Ok(Some(m)),
            Some(other) => Err(wrong(path, "map", other)),
        }
    }

    /// Mutable access to a nested value, without creating anything.
    pub fn nested_mut(&mut self, path: &[&str]) -> Option<&mut Json> {
        let mut cur = &mut self.0;
        for seg in path {
            cur = cur.as_object_mut()?.get_mut(*seg)?;
        }
        Some(cur)
    }

    /// Set `path` to `value`, creating (or replacing non-map) intermediates with empty maps.
    pub fn set_nested(&mut self, path: &[&str], value: Json) {
        let Some((last, parents)) = path.split_last() else {
            self.0 = value;
            return;
        };
        let mut cur = &mut self.0;
        for seg in parents {
            if !cur.is_object() {
                *cur = Json::Object(Map::new());
            }
            let Some(map) = cur.as_object_mut() else { return };
            cur = map.entry(seg.to_string()).or_insert_with(|| Json::Object(Map::new()));
        }
        if !cur.is_object() {
            *cur = Json::Object(Map::new());
        }
        if let Json::Object(map) = cur {
            map.insert(last.to_string(), value);
        }
    }

    /// Remove the value at `path`, returning it if present.
    pub fn remove_nested(&mut self, path: &[&str]) -> Option<Json> {
        let (last, parents) = path.split_last()?;
        self.nested_mut(parents)?.as_object_mut()?.remove(*last)
    }
}
