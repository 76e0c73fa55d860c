//! Where workload kinds keep their pod template.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Nested paths into a workload's pod template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadPaths {
    /// Pod template labels map.
    pub template_labels: &'static [&'static str],
    /// Pod spec holding `containers` and `initContainers`.
    pub pod_spec: &'static [&'static str],
}

const TEMPLATE: WorkloadPaths = WorkloadPaths {
    template_labels: &["spec", "template", "metadata", "labels"],
    pod_spec: &["spec", "template", "spec"],
};

const CRONJOB: WorkloadPaths = WorkloadPaths {
    template_labels: &["spec", "jobTemplate", "spec", "template", "metadata", "labels"],
    pod_spec: &["spec", "jobTemplate", "spec", "template", "spec"],
};

static WORKLOADS: Lazy<HashMap<&'static str, WorkloadPaths>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("CronJob", CRONJOB);
    for kind in ["DaemonSet", "Deployment", "Job", "ReplicaSet", "ReplicationController", "StatefulSet"] {
        m.insert(kind, TEMPLATE);
    }
    m
});

/// Pod template paths for a workload kind, `None` for everything else.
pub fn workload_paths(kind: &str) -> Option<&'static WorkloadPaths> {
    WORKLOADS.get(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cronjob_nests_under_job_template() {
        assert_eq!(workload_paths("CronJob").unwrap().pod_spec[1], "jobTemplate");
        assert_eq!(workload_paths("Deployment").unwrap().template_labels.len(), 4);
        assert!(workload_paths("Pod").is_none());
        assert!(workload_paths("Service").is_none());
    }
}
