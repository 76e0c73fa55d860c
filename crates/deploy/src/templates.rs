//! Objects synthesized when the inputs imply them.

use kdeploy_core::{ImageRef, Object, NAME_LABEL};
use serde_json::json;

const REPLICAS: i64 = 3;
const HPA_MIN_REPLICAS: i64 = 1;
const HPA_MAX_REPLICAS: i64 = 5;
const HPA_CPU_PERCENT: i64 = 80;

/// A Deployment running `image` plus an autoscaler for it, both named after the
/// repository's last path segment.
pub fn deployment_and_hpa(image: &ImageRef) -> (Object, Object) {
    let name = image.repository_suffix();
    let mut deployment = Object::new("apps/v1", "Deployment", name);
    deployment.set_nested(&["metadata", "labels"], json!({ "app": name }));
    deployment.set_nested(
        &["spec"],
        json!({
            "replicas": REPLICAS,
            "selector": { "matchLabels": { "app": name } },
            "template": {
                "metadata": { "labels": { "app": name } },
                "spec": { "containers": [ { "name": format!("{}-1", name), "image": image.to_string() } ] }
            }
        }),
    );

    let mut hpa = Object::new("autoscaling/v1", "HorizontalPodAutoscaler", &format!("{}-hpa", name));
    hpa.set_nested(&["metadata", "labels"], json!({ "app": name }));
    hpa.set_nested(
        &["spec"],
        json!({
            "scaleTargetRef": { "apiVersion": "apps/v1", "kind": "Deployment", "name": name },
            "minReplicas": HPA_MIN_REPLICAS,
            "maxReplicas": HPA_MAX_REPLICAS,
            "targetCPUUtilizationPercentage": HPA_CPU_PERCENT
        }),
    );
    (deployment, hpa)
}

/// `<app>-service`: a LoadBalancer in front of the app's pods on `port`.
pub fn service(app: &str, port: u16) -> Object {
    let mut selector = serde_json::Map::new();
    selector.insert(NAME_LABEL.to_string(), json!(app));
    let mut svc = Object::new("v1", "Service", &service_name(app));
    svc.set_nested(
        &["spec"],
        json!({
            "type": "LoadBalancer",
            "selector": selector,
            "ports": [ { "protocol": "TCP", "port": port, "targetPort": port } ]
        }),
    );
    svc
}

pub fn service_name(app: &str) -> String {
    format!("{}-service", app)
}

pub fn namespace(name: &str) -> Object {
    Object::new("v1", "Namespace", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_pair_named_from_repository() {
        let image: ImageRef = "gcr.io/acme/shop/web:v2".parse().unwrap();
        let (d, h) = deployment_and_hpa(&image);
        assert_eq!(d.key(), "Deployment/web");
        assert_eq!(h.key(), "HorizontalPodAutoscaler/web-hpa");
        let containers = d.nested_slice(&["spec", "template", "spec", "containers"]).unwrap().unwrap();
        assert_eq!(containers[0]["image"], json!("gcr.io/acme/shop/web:v2"));
        assert_eq!(h.nested_str(&["spec", "scaleTargetRef", "name"]), Ok(Some("web")));
        assert_eq!(h.nested_i64(&["spec", "maxReplicas"]), Ok(Some(5)));
    }

    #[test]
    fn service_selects_app_label() {
        let s = service("shop", 8080);
        assert_eq!(s.name(), "shop-service");
        assert_eq!(s.nested_str(&["spec", "type"]), Ok(Some("LoadBalancer")));
        assert_eq!(s.nested_str(&["spec", "selector", NAME_LABEL]), Ok(Some("shop")));
        let ports = s.nested_slice(&["spec", "ports"]).unwrap().unwrap();
        assert_eq!(ports[0]["targetPort"], json!(8080));
    }
}
