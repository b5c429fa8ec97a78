//! EKS / Kubernetes classifier
//!
//! Instances managed by a cluster are resized through their node group, not
//! individually, so they are excluded from the report.

use std::collections::BTreeMap;

use crate::model::Recommendation;

/// Tag keys set by EKS on node instances
pub const EKS_TAG_KEYS: [&str; 3] = [
    "eks:cluster-name",
    "eks:nodegroup-name",
    "aws:eks:cluster-name",
];

/// Tag key prefixes set by Kubernetes cluster tooling
pub const K8S_TAG_PREFIXES: [&str; 2] = ["kubernetes.io/cluster/", "k8s.io/cluster/"];

/// True when any tag key marks the instance as cluster-managed.
/// Keys compare case-insensitively.
pub fn is_managed(tags: &BTreeMap<String, String>) -> bool {
    tags.keys().any(|key| {
        let key = key.to_lowercase();
        EKS_TAG_KEYS.contains(&key.as_str())
            || K8S_TAG_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
    })
}

/// Stable partition into `(kept, excluded)`
pub fn filter(records: Vec<Recommendation>) -> (Vec<Recommendation>, Vec<Recommendation>) {
    let (excluded, kept): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| is_managed(&r.tags));

    for rec in &excluded {
        tracing::debug!(instance_id = %rec.instance_id, "Excluding EKS/Kubernetes instance");
    }
    tracing::info!(
        kept = kept.len(),
        excluded = excluded.len(),
        "Applied EKS/Kubernetes filter"
    );
    (kept, excluded)
}
