use serde::{Deserialize, Serialize};

/// Describes a newly-discovered pod sandbox, queued for an agent to wrap
/// with a sidecar proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub sandbox_name: String,
    pub sandbox_ip: String,
    pub host_ip: String,
}
