//! Operator-facing rule application: validates an incoming `RatioRule` or
//! `RegexRule` against the snapshot invariants, regenerates its wire
//! generator, and commits it to the snapshot — all under one acquisition
//! of the snapshot's coarse lock — then stages it into every registered
//! agent's rule buffer once that lock has been released.

use skafos_core::{RatioRule, RegexRule, RuleMeta};

use crate::agent_manager::AgentManager;
use crate::buffer::{ProxyBuffer, RuleBuffer};
use crate::error::ControllerError;
use crate::rulegen;
use crate::snapshot::Snapshot;
use parking_lot::Mutex;

/// Shared controller state, constructed once in `main` and handed to the
/// HTTP app, the reconciler, and the messager via `Arc`. No process-wide
/// globals.
pub struct ControllerState {
    pub snapshot: Mutex<Snapshot>,
    pub rule_buffer: RuleBuffer,
    pub proxy_buffer: ProxyBuffer,
    pub agent_manager: AgentManager,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(Snapshot::new()),
            rule_buffer: RuleBuffer::new(),
            proxy_buffer: ProxyBuffer::new(),
            agent_manager: AgentManager::new(),
        }
    }

    /// Registers a new agent, seeding its buffers with the current rule
    /// set so a late-joining agent still receives every rule already in
    /// effect. The generator maps are computed while the snapshot lock is
    /// held, then the lock is dropped before handing them to the (async)
    /// agent manager, so the snapshot's guard never crosses an `.await`.
    pub async fn add_agent(&self, address: &str, port: u16) {
        let (ratio, regex) = {
            let snapshot = self.snapshot.lock();
            (snapshot.all_ratio_generators(rulegen::generate_ratio_rule), snapshot.all_regex_generators(rulegen::generate_regex_rule))
        };
        self.agent_manager.add_agent(address, port, ratio, regex, &self.rule_buffer, &self.proxy_buffer).await;
    }

    /// Validates the rule and commits it to the snapshot atomically under
    /// one lock acquisition (so two concurrent applies for the same name
    /// or service can't both pass `check_rule`), then stages it into every
    /// agent's rule buffer after the snapshot lock has been released.
    pub async fn apply_ratio_rule(&self, rule: RatioRule) -> Result<(), ControllerError> {
        let name = rule.name().to_string();
        let generator = {
            let mut snapshot = self.snapshot.lock();
            snapshot.check_rule(&name, &rule.spec.service_name)?;
            let (service, pods) = snapshot.get_service_and_pods(&rule.spec.service_name)?;
            let generator = rulegen::generate_ratio_rule(&rule, service, &pods);

            let service_name = rule.spec.service_name.clone();
            snapshot.ratio_rules.insert(name.clone(), rule);
            snapshot.service_to_rule.insert(service_name, RuleMeta { kind: skafos_core::Kind::Ratio, name: name.clone() });
            generator
        };

        self.rule_buffer.set_ratio_rule(&name, Some(generator)).await;
        Ok(())
    }

    pub async fn apply_regex_rule(&self, rule: RegexRule) -> Result<(), ControllerError> {
        let name = rule.name().to_string();
        let generator = {
            let mut snapshot = self.snapshot.lock();
            snapshot.check_rule(&name, &rule.spec.service_name)?;
            let (service, pods) = snapshot.get_service_and_pods(&rule.spec.service_name)?;
            let generator = rulegen::generate_regex_rule(&rule, service, &pods);

            let service_name = rule.spec.service_name.clone();
            snapshot.regex_rules.insert(name.clone(), rule);
            snapshot.service_to_rule.insert(service_name, RuleMeta { kind: skafos_core::Kind::Regex, name: name.clone() });
            generator
        };

        self.rule_buffer.set_regex_rule(&name, Some(generator)).await;
        Ok(())
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skafos_core::{PodPhase, PortPair, RatioSpec, Service};

    fn seed_service(state: &ControllerState) {
        let mut snapshot = state.snapshot.lock();
        snapshot.services.insert(
            "svc".to_string(),
            Service { name: "svc".into(), cluster_ip: "10.0.0.1".into(), ports: vec![PortPair { port: 80, target_port: 8080 }] },
        );
        snapshot.services_to_pods.insert("svc".to_string(), vec!["pod-1".to_string()]);
        snapshot.pods.insert(
            "pod-1".to_string(),
            skafos_core::Pod {
                name: "pod-1".into(),
                uid: "pod-1".into(),
                phase: PodPhase::Ready,
                pod_ip: "10.1.1.1".into(),
                host_ip: "10.0.0.2".into(),
                labels: Default::default(),
            },
        );
    }

    fn ratio_rule(name: &str) -> RatioRule {
        RatioRule {
            meta: skafos_core::RuleMeta { kind: skafos_core::Kind::Ratio, name: name.into() },
            spec: RatioSpec { service_name: "svc".into(), ratio: 50, selector: Default::default() },
        }
    }

    #[tokio::test]
    async fn apply_ratio_rule_rejects_unknown_service() {
        let state = ControllerState::new();
        let rule = ratio_rule("R1");
        assert!(state.apply_ratio_rule(rule).await.is_err());
    }

    #[tokio::test]
    async fn apply_ratio_rule_stages_generator_and_updates_snapshot() {
        let state = ControllerState::new();
        seed_service(&state);
        state.agent_manager.add_agent("10.0.0.9", 15000, Default::default(), Default::default(), &state.rule_buffer, &state.proxy_buffer).await;

        state.apply_ratio_rule(ratio_rule("R1")).await.unwrap();

        let snapshot = state.snapshot.lock();
        assert!(snapshot.ratio_rules.contains_key("R1"));
        assert_eq!(snapshot.service_to_rule.get("svc").unwrap().name, "R1");
    }

    #[tokio::test]
    async fn apply_ratio_rule_rejects_duplicate_name() {
        let state = ControllerState::new();
        seed_service(&state);
        state.apply_ratio_rule(ratio_rule("R1")).await.unwrap();
        assert!(state.apply_ratio_rule(ratio_rule("R1")).await.is_err());
    }

    #[tokio::test]
    async fn apply_ratio_rule_rejects_service_already_ruled() {
        let state = ControllerState::new();
        seed_service(&state);
        state.apply_ratio_rule(ratio_rule("R1")).await.unwrap();
        assert!(state.apply_ratio_rule(ratio_rule("R2")).await.is_err());
    }
}
