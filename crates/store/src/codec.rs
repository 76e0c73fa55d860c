//! YAML <-> [`Object`] conversion.

use kdeploy_core::{CodecError, Object};
use serde_json::Value as Json;

/// Decode exactly one YAML document.
pub fn decode(bytes: &[u8]) -> Result<Object, CodecError> {
    let val: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
    if !val.is_mapping() {
        return Err(if val.is_null() { CodecError::Empty } else { CodecError::NotAMapping });
    }
    let json = serde_json::to_value(val)?;
    Object::from_value(json)
}

/// Encode to YAML, dropping an empty `metadata.creationTimestamp` and an empty `status`.
pub fn encode(obj: &Object) -> Result<String, CodecError> {
    let mut obj = obj.clone();
    let empty_ts = match obj.nested(&["metadata", "creationTimestamp"]) {
        Ok(Some(Json::Null)) => true,
        Ok(Some(Json::String(s))) => s.is_empty(),
        _ => false,
    };
    if empty_ts {
        obj.remove_nested(&["metadata", "creationTimestamp"]);
    }
    let empty_status = match obj.nested(&["status"]) {
        Ok(Some(Json::Null)) => true,
        Ok(Some(Json::Object(m))) => m.is_empty(),
        _ => false,
    };
    if empty_status {
        obj.remove_nested(&["status"]);
    }
    Ok(serde_yaml::to_string(obj.as_value())?)
}

/// Split a multi-document stream on lines starting with `---`.
/// Documents holding only whitespace and comments are dropped.
pub fn split_documents(text: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut cur = String::new();
    for line in text.lines() {
        if line.starts_with("---") {
            docs.push(std::mem::take(&mut cur));
            continue;
        }
        cur.push_str(line);
        cur.push('\n');
    }
    docs.push(cur);
    docs.into_iter()
        .filter(|d| {
            d.lines().any(|l| {
                let t = l.trim();
                !t.is_empty() && !t.starts_with('#')
            })
        })
        .collect()
}
