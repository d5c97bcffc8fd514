//! Tracks every agent that has registered with this controller, keyed by
//! the address the agent announced itself under (not its RPC URL), since
//! that's also the key `ProxyBuffer::add_sandbox` matches sandbox host
//! IPs against.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use skafos_core::{RatioRuleGenerator, RegexRuleGenerator};

use crate::buffer::{ProxyBuffer, RuleBuffer};

#[derive(Default)]
pub struct AgentManager {
    /// `address -> "address:port"` RPC URL.
    agents: RwLock<BTreeMap<String, String>>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly-seen agent and fully re-stages it: `ratio`/`regex`
    /// are every rule generator currently live in the snapshot, regenerated
    /// by the caller and seeded into the agent's rule-buffer slot
    /// immediately, rather than relying on the next reconcile diff to
    /// notice it (which would otherwise leave a freshly-joined agent
    /// without any rules until some unrelated pod or service change
    /// happened to trigger a re-diff). Takes the generator maps rather than
    /// the snapshot itself so the caller's snapshot lock never has to be
    /// held across the buffer's own (async) lock.
    pub async fn add_agent(
        &self,
        address: &str,
        port: u16,
        ratio: BTreeMap<String, RatioRuleGenerator>,
        regex: BTreeMap<String, RegexRuleGenerator>,
        rule_buffer: &RuleBuffer,
        proxy_buffer: &ProxyBuffer,
    ) {
        let agent_url = format!("{address}:{port}");
        self.agents.write().insert(address.to_string(), agent_url);

        rule_buffer.seed_agent_buffer(address, ratio, regex).await;
        proxy_buffer.reset_agent_buffer(address).await;
    }

    pub fn list_all_agents(&self) -> BTreeMap<String, String> {
        self.agents.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_agent_registers_its_rpc_url() {
        let manager = AgentManager::new();
        let rule_buffer = RuleBuffer::new();
        let proxy_buffer = ProxyBuffer::new();
        manager.add_agent("10.0.0.2", 15000, BTreeMap::new(), BTreeMap::new(), &rule_buffer, &proxy_buffer).await;
        assert_eq!(manager.list_all_agents().get("10.0.0.2"), Some(&"10.0.0.2:15000".to_string()));
    }
}
