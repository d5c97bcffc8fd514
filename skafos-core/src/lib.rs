//! Shared data model and wire formats for the Skafos service mesh.
//!
//! This crate holds everything that crosses a process boundary: the pod and
//! service shapes handed down by the orchestrator, the rule definitions an
//! operator submits, and the serializable rule generators that travel from
//! the controller to agents to proxies. Nothing in here depends on `tokio`,
//! `actix-web`, or any transport — it is pure data plus the validation that
//! the data model's invariants require.

pub mod error;
pub mod generator;
pub mod pod;
pub mod rule;
pub mod sandbox;
pub mod service;

pub use error::ValidationError;
pub use generator::{Config, HeaderRegexMatcher, RatioRuleGenerator, RegexRuleGenerator};
pub use pod::{Pod, PodPhase};
pub use rule::{Kind, Matcher, RatioRule, RatioSpec, RegexRule, RegexSpec, RuleMeta};
pub use sandbox::SandboxInfo;
pub use service::{PortPair, Service};

/// Default ports, modeled on Istio's well-known port table.
pub mod ports {
    /// Controller RPC port (operator + agent registration).
    pub const CONTROLLER: u16 = 15017;
    /// Agent RPC port.
    pub const AGENT: u16 = 15000;
    /// Orchestrator inventory API port.
    pub const ORCHESTRATOR: u16 = 6443;
    /// Proxy data-plane port (HTTP/1.x only).
    pub const PROXY_DATA: u16 = 16000;
    /// Proxy config-push port.
    pub const PROXY_CONFIG: u16 = 16001;
}

/// Treats `localhost` and `127.0.0.1` as the same host address, matching
/// the orchestrator's notion of "this node" regardless of which form an
/// agent registered under.
pub fn is_same_host_addr(a: &str, b: &str) -> bool {
    if (a == "localhost" && b == "127.0.0.1") || (a == "127.0.0.1" && b == "localhost") {
        return true;
    }
    a == b
}

/// Derives the name of the sandbox (pause) container for a pod, stable
/// across reconcile ticks as long as the pod's identifier doesn't change.
pub fn pod_specific_sandbox_name(pod: &Pod) -> String {
    format!("{}_pause", pod.uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_and_loopback_are_the_same_host() {
        assert!(is_same_host_addr("localhost", "127.0.0.1"));
        assert!(is_same_host_addr("127.0.0.1", "localhost"));
        assert!(is_same_host_addr("10.0.0.5", "10.0.0.5"));
        assert!(!is_same_host_addr("10.0.0.5", "10.0.0.6"));
        assert!(!is_same_host_addr("localhost", "10.0.0.5"));
    }

    #[test]
    fn sandbox_name_is_stable_for_a_given_pod() {
        let pod = Pod {
            name: "web-0".into(),
            uid: "abc-123".into(),
            phase: PodPhase::Ready,
            pod_ip: "10.1.1.1".into(),
            host_ip: "10.0.0.1".into(),
            labels: Default::default(),
        };
        assert_eq!(pod_specific_sandbox_name(&pod), "abc-123_pause");
    }
}
