use serde::{Deserialize, Serialize};

/// A single `servicePort -> targetPort` mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub port: u16,
    pub target_port: u16,
}

/// A service as discovered from the orchestrator's inventory API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub cluster_ip: String,
    pub ports: Vec<PortPair>,
}
