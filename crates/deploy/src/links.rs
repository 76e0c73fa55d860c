//! Cloud Console links printed after a rollout.

use kdeploy_core::Object;

const CONSOLE: &str = "https://console.cloud.google.com/kubernetes";

/// Console page segment for kinds that have a detail page.
fn page(kind: &str) -> Option<&'static str> {
    Some(match kind {
        "Deployment" => "deployment",
        "StatefulSet" => "statefulset",
        "DaemonSet" => "daemonset",
        "ReplicaSet" => "replicaset",
        "Pod" => "pod",
        "Job" => "job",
        "CronJob" => "cronjob",
        "Service" => "service",
        "Ingress" => "ingress",
        "Application" => "application",
        _ => return None,
    })
}

/// Where the objects were deployed.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleTarget<'a> {
    pub project: &'a str,
    /// `(cluster, location)` when the cluster identity is known.
    pub cluster: Option<(&'a str, &'a str)>,
}

/// Render the workloads overview link and, with a known cluster, one detail link per object.
pub fn console_links<'a>(
    target: ConsoleTarget<'_>,
    objects: impl IntoIterator<Item = &'a Object>,
    namespace_override: Option<&str>,
) -> String {
    let mut lines = vec![
        "Console links:".to_string(),
        format!("  Workloads: {}/workload?project={}", CONSOLE, target.project),
    ];
    if let Some((cluster, location)) = target.cluster {
        let mut rows: Vec<(String, String)> = objects
            .into_iter()
            .filter_map(|o| {
                let page = page(o.kind())?;
                let ns = namespace_override.or(o.namespace()).unwrap_or("default");
                Some((
                    o.key(),
                    format!(
                        "{}/{}/{}/{}/{}/{}?project={}",
                        CONSOLE, page, location, cluster, ns, o.name(), target.project
                    ),
                ))
            })
            .collect();
        rows.sort();
        lines.extend(rows.into_iter().map(|(key, url)| format!("  {}: {}", key, url)));
    }
    lines.join("\n")
}
