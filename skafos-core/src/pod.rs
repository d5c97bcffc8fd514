use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a pod, as reported by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Ready,
    Failed,
}

/// A pod as discovered from the orchestrator's inventory API.
///
/// `labels` is a `BTreeMap` rather than a `HashMap` so that structural
/// equality checks during reconciliation (`pod == existing_pod`) are not at
/// the mercy of hash-iteration order, and so that selector comparisons
/// (`pod.labels == rule.selector`) are well defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub uid: String,
    pub phase: PodPhase,
    pub pod_ip: String,
    pub host_ip: String,
    pub labels: BTreeMap<String, String>,
}

impl Pod {
    pub fn is_ready(&self) -> bool {
        self.phase == PodPhase::Ready
    }
}
