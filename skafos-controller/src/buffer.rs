//! Per-agent buffers the reconciler and operator-facing API stage
//! updates into; the messager drains them on its own tick. Each buffer
//! holds its own lock for the full duration of a flush wave: deliveries
//! are spawned concurrently, one per agent, and only reset their slot
//! once their own delivery succeeds, all before the lock is released.
//! This mirrors the original's `LockBuffer`/`wg.Wait()`/`UnlockBuffer`
//! pattern and keeps a concurrent `set_*_rule`/`add_sandbox` call that
//! lands mid-flight queued behind the wave instead of racing it.

use std::collections::BTreeMap;
use std::future::Future;

use log::{error, info};
use skafos_core::{Config, RatioRuleGenerator, RegexRuleGenerator, SandboxInfo};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Buffer of merged rule-generator config, one slot per agent address.
#[derive(Default)]
pub struct RuleBuffer {
    rules: Mutex<BTreeMap<String, Config>>,
}

impl RuleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reset_agent_buffer(&self, agent_addr: &str) {
        self.rules.lock().await.insert(agent_addr.to_string(), Config::default());
    }

    /// Seeds an agent's buffer with the full current set of rule
    /// generators, for agents that register after rules already exist.
    pub async fn seed_agent_buffer(&self, agent_addr: &str, ratio: BTreeMap<String, RatioRuleGenerator>, regex: BTreeMap<String, RegexRuleGenerator>) {
        let config = Config {
            ratio_rules: ratio.into_iter().map(|(k, v)| (k, Some(v))).collect(),
            regex_rules: regex.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        };
        self.rules.lock().await.insert(agent_addr.to_string(), config);
    }

    pub async fn set_ratio_rule(&self, rule_name: &str, rule: Option<RatioRuleGenerator>) {
        let mut rules = self.rules.lock().await;
        for config in rules.values_mut() {
            config.ratio_rules.insert(rule_name.to_string(), rule.clone());
        }
        info!("[RULE BUFFER] add ratio rule {rule_name}: {rule:?}");
    }

    pub async fn set_regex_rule(&self, rule_name: &str, rule: Option<RegexRuleGenerator>) {
        let mut rules = self.rules.lock().await;
        for config in rules.values_mut() {
            config.regex_rules.insert(rule_name.to_string(), rule.clone());
        }
        info!("[RULE BUFFER] add regex rule {rule_name}: {rule:?}");
    }

    pub(crate) async fn is_empty(&self, agent_addr: &str) -> bool {
        self.rules.lock().await.get(agent_addr).map(Config::is_empty).unwrap_or(true)
    }

    #[cfg(test)]
    pub async fn is_nil_for_test(&self, agent_addr: &str, rule_name: &str) -> bool {
        self.rules.lock().await.get(agent_addr).and_then(|c| c.ratio_rules.get(rule_name)).map(|v| v.is_none()).unwrap_or(false)
    }

    #[cfg(test)]
    pub async fn contains_ratio_rule_for_test(&self, agent_addr: &str, rule_name: &str) -> bool {
        self.rules.lock().await.get(agent_addr).map(|c| c.ratio_rules.contains_key(rule_name)).unwrap_or(false)
    }

    /// Drains every non-empty agent slot, pushing its config over
    /// `reqwest`, one concurrent delivery per agent. The buffer's lock
    /// is acquired once for the whole wave and only released after
    /// every delivery (and its reset, on success) has completed, so a
    /// `set_ratio_rule`/`set_regex_rule` call that lands on an agent's
    /// slot mid-flight queues behind the wave instead of being wiped
    /// out by a reset that raced ahead of it.
    pub async fn flush(&self, agents: &BTreeMap<String, String>) {
        self.flush_with(agents, |agent_url, config| async move { crate::client::update_rule(&agent_url, &config).await }).await
    }

    async fn flush_with<F, Fut>(&self, agents: &BTreeMap<String, String>, send: F)
    where
        F: Fn(String, Config) -> Fut,
        Fut: Future<Output = Result<(), reqwest::Error>> + Send + 'static,
    {
        let mut rules = self.rules.lock().await;

        let mut deliveries = JoinSet::new();
        for (addr, agent_url) in agents {
            let Some(config) = rules.get(addr).filter(|c| !c.is_empty()).cloned() else {
                continue;
            };
            let addr = addr.clone();
            let delivery = send(agent_url.clone(), config);
            deliveries.spawn(async move { (addr, delivery.await) });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((addr, Ok(()))) => {
                    info!("[RULE BUFFER] updated rules for agent {addr}, now reset buffer");
                    rules.insert(addr, Config::default());
                }
                Ok((addr, Err(err))) => error!("[RULE BUFFER] fail to inform agent {addr}: {err}"),
                Err(join_err) => error!("[RULE BUFFER] delivery task panicked: {join_err}"),
            }
        }
    }
}

/// Buffer of pending sandbox-creation requests, one slot per agent
/// address, filtered to the agent's own host.
#[derive(Default)]
pub struct ProxyBuffer {
    sandboxes: Mutex<BTreeMap<String, Vec<SandboxInfo>>>,
}

impl ProxyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reset_agent_buffer(&self, agent_addr: &str) {
        self.sandboxes.lock().await.insert(agent_addr.to_string(), Vec::new());
    }

    /// Appends a newly-discovered sandbox to every agent slot whose
    /// address matches the sandbox's host, per `IsSameHostAddr`.
    pub async fn add_sandbox(&self, info: SandboxInfo) {
        let mut sandboxes = self.sandboxes.lock().await;
        for (addr, bucket) in sandboxes.iter_mut() {
            if skafos_core::is_same_host_addr(addr, &info.host_ip) {
                info!("[PROXY BUFFER] add proxy with ip {} for agent {addr}", info.sandbox_ip);
                bucket.push(info.clone());
            }
        }
    }

    pub(crate) async fn is_empty(&self, agent_addr: &str) -> bool {
        self.sandboxes.lock().await.get(agent_addr).map(|v| v.is_empty()).unwrap_or(true)
    }

    #[cfg(test)]
    pub async fn is_empty_for_test(&self, agent_addr: &str) -> bool {
        self.is_empty(agent_addr).await
    }

    /// Same lock-held-for-the-whole-wave shape as `RuleBuffer::flush`.
    pub async fn flush(&self, agents: &BTreeMap<String, String>) {
        self.flush_with(agents, |agent_url, infos| async move { crate::client::create_proxy(&agent_url, &infos).await }).await
    }

    async fn flush_with<F, Fut>(&self, agents: &BTreeMap<String, String>, send: F)
    where
        F: Fn(String, Vec<SandboxInfo>) -> Fut,
        Fut: Future<Output = Result<(), reqwest::Error>> + Send + 'static,
    {
        let mut sandboxes = self.sandboxes.lock().await;

        let mut deliveries = JoinSet::new();
        for (addr, agent_url) in agents {
            let Some(infos) = sandboxes.get(addr).filter(|v| !v.is_empty()).cloned() else {
                continue;
            };
            let addr = addr.clone();
            let delivery = send(agent_url.clone(), infos);
            deliveries.spawn(async move { (addr, delivery.await) });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((addr, Ok(()))) => {
                    info!("[PROXY BUFFER] created proxies for agent {addr}, now reset buffer");
                    sandboxes.insert(addr, Vec::new());
                }
                Ok((addr, Err(err))) => error!("[PROXY BUFFER] fail to inform agent {addr}: {err}"),
                Err(join_err) => error!("[PROXY BUFFER] delivery task panicked: {join_err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ratio_rule() -> RatioRuleGenerator {
        RatioRuleGenerator { service_ip: "10.0.0.1".into(), port_mapping: Default::default(), ratio: 50, proxied_ips: vec![], other_ips: vec![] }
    }

    #[tokio::test]
    async fn ratio_rule_fans_out_to_every_agent_slot() {
        let buffer = RuleBuffer::new();
        buffer.reset_agent_buffer("10.0.0.2").await;
        buffer.reset_agent_buffer("10.0.0.3").await;
        buffer.set_ratio_rule("R", Some(ratio_rule())).await;
        assert!(!buffer.is_empty("10.0.0.2").await);
        assert!(!buffer.is_empty("10.0.0.3").await);
    }

    #[tokio::test]
    async fn deleting_a_rule_writes_a_nil_entry_not_a_removal() {
        let buffer = RuleBuffer::new();
        buffer.reset_agent_buffer("10.0.0.2").await;
        buffer.set_ratio_rule("R", None).await;
        assert!(buffer.is_nil_for_test("10.0.0.2", "R").await);
    }

    #[tokio::test]
    async fn proxy_buffer_only_adds_sandbox_to_matching_host() {
        let buffer = ProxyBuffer::new();
        buffer.reset_agent_buffer("10.0.0.2").await;
        buffer.reset_agent_buffer("10.0.0.3").await;
        buffer.add_sandbox(SandboxInfo { sandbox_name: "pod-0_pause".into(), sandbox_ip: "10.1.1.1".into(), host_ip: "10.0.0.2".into() }).await;
        assert!(!buffer.is_empty_for_test("10.0.0.2").await);
        assert!(buffer.is_empty_for_test("10.0.0.3").await);
    }

    /// The agent's in-flight delivery is held up by a deliberately slow
    /// mock sender; a `set_ratio_rule` staged while it's in flight must
    /// be queued out behind the whole wave (the buffer lock is held for
    /// its duration), landing strictly after the reset rather than
    /// getting clobbered by it.
    #[tokio::test]
    async fn rule_staged_during_in_flight_flush_survives_the_reset() {
        let buffer = RuleBuffer::new();
        buffer.reset_agent_buffer("10.0.0.2").await;
        buffer.set_ratio_rule("R1", Some(ratio_rule())).await;

        let mut agents = BTreeMap::new();
        agents.insert("10.0.0.2".to_string(), "10.0.0.2:15000".to_string());

        let flush = buffer.flush_with(&agents, |_agent_url, _config| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<(), reqwest::Error>(())
        });
        let stage = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            buffer.set_ratio_rule("R2", Some(ratio_rule())).await;
        };
        tokio::join!(flush, stage);

        assert!(!buffer.contains_ratio_rule_for_test("10.0.0.2", "R1").await, "R1 should have been cleared by the successful delivery's reset");
        assert!(buffer.contains_ratio_rule_for_test("10.0.0.2", "R2").await, "R2 staged mid-flight must survive, not be wiped by the reset");
    }

    #[tokio::test]
    async fn sandbox_staged_during_in_flight_flush_survives_the_reset() {
        let buffer = ProxyBuffer::new();
        buffer.reset_agent_buffer("10.0.0.2").await;
        buffer.add_sandbox(SandboxInfo { sandbox_name: "pod-0_pause".into(), sandbox_ip: "10.1.1.1".into(), host_ip: "10.0.0.2".into() }).await;

        let mut agents = BTreeMap::new();
        agents.insert("10.0.0.2".to_string(), "10.0.0.2:15000".to_string());

        let flush = buffer.flush_with(&agents, |_agent_url, _infos| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<(), reqwest::Error>(())
        });
        let stage = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            buffer.add_sandbox(SandboxInfo { sandbox_name: "pod-1_pause".into(), sandbox_ip: "10.1.1.2".into(), host_ip: "10.0.0.2".into() }).await;
        };
        tokio::join!(flush, stage);

        assert!(!buffer.is_empty_for_test("10.0.0.2").await, "sandbox staged mid-flight must survive, not be wiped by the reset");
    }
}
