//! Human-readable table of deployed objects and their readiness.

use kdeploy_core::Object;
use tabled::builder::Builder;
use tabled::settings::{Padding, Style};

use crate::ResourceSet;

const HEADERS: [&str; 4] = ["KIND", "NAME", "READY", "EXTERNAL"];

fn readiness_cell(obj: &Object) -> &'static str {
    match kdeploy_readiness::is_ready(obj) {
        Ok(true) => "Yes",
        Ok(false) => "No",
        Err(_) => "Unknown",
    }
}

/// LoadBalancer ingress IPs or the ExternalName target of a Service.
fn external_cell(obj: &Object) -> String {
    if obj.kind() != "Service" {
        return String::new();
    }
    let raw = obj.as_value();
    match raw.pointer("/spec/type").and_then(|v| v.as_str()) {
        Some("LoadBalancer") => raw
            .pointer("/status/loadBalancer/ingress")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|it| it.get("ip").and_then(|v| v.as_str()))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default(),
        Some("ExternalName") => raw
            .pointer("/spec/externalName")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// Render one row per object sorted by kind, then name.
pub fn deploy_summary(set: &ResourceSet) -> String {
    let mut rows: Vec<[String; 4]> = set
        .objects()
        .map(|o| {
            [
                o.kind().to_string(),
                o.name().to_string(),
                readiness_cell(o).to_string(),
                external_cell(o),
            ]
        })
        .collect();
    rows.sort_by(|a, b| a[0].cmp(&b[0]).then_with(|| a[1].cmp(&b[1])));

    let mut builder = Builder::default();
    builder.push_record(HEADERS);
    for row in rows {
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(Style::empty()).with(Padding::new(0, 2, 0, 0));
    table.to_string().lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: serde_json::Value) -> Object {
        Object::from_value(v).unwrap()
    }

    #[test]
    fn sorted_table_with_external_column() {
        let mut set = ResourceSet::new();
        set.add_object(obj(json!({
            "apiVersion": "v1", "kind": "Service", "metadata": { "name": "web" },
            "spec": { "type": "LoadBalancer", "clusterIP": "10.0.0.1" },
            "status": { "loadBalancer": { "ingress": [ { "ip": "1.2.3.4" }, { "ip": "5.6.7.8" } ] } }
        })))
        .unwrap();
        set.add_object(obj(json!({
            "apiVersion": "v1", "kind": "Service", "metadata": { "name": "db" },
            "spec": { "type": "ExternalName", "externalName": "db.example.com" }
        })))
        .unwrap();
        set.add_object(obj(json!({
            "apiVersion": "v1", "kind": "PersistentVolumeClaim", "metadata": { "name": "data" },
            "status": { "phase": "Pending" }
        })))
        .unwrap();
        set.add_object(obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment", "metadata": { "name": "web", "generation": 1 },
            "status": "broken"
        })))
        .unwrap();

        let s = deploy_summary(&set);
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("KIND"));
        assert!(lines[1].starts_with("Deployment") && lines[1].contains("Unknown"), "{}", lines[1]);
        assert!(lines[2].starts_with("PersistentVolumeClaim") && lines[2].contains("No"));
        assert!(lines[3].contains("db") && lines[3].ends_with("db.example.com"));
        assert!(lines[4].contains("web") && lines[4].contains("Yes") && lines[4].ends_with("1.2.3.4,5.6.7.8"));
        // columns are aligned
        let ready_col = lines[0].find("READY").unwrap();
        assert_eq!(&lines[2][ready_col..ready_col + 2], "No");
        assert_eq!(&lines[4][ready_col..ready_col + 3], "Yes");
    }

    #[test]
    fn empty_set_renders_only_the_header() {
        let s = deploy_summary(&ResourceSet::new());
        assert_eq!(s.split_whitespace().collect::<Vec<_>>(), HEADERS);
        assert_eq!(s.lines().count(), 1);
    }
}
