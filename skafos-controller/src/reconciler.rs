//! The reconciliation loop: polls the orchestrator, diffs against the
//! snapshot, regenerates affected rule generators, and stages deltas into
//! the per-agent buffers. Pod changes are always folded into the
//! snapshot before service changes are diffed, since a service's pod
//! list can only be judged ready against the just-updated pod set.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, error, info};
use skafos_core::{Kind, Pod, RatioRuleGenerator, RegexRuleGenerator, RuleMeta, SandboxInfo, Service};

use crate::orchestrator::OrchestratorClient;
use crate::pilot::ControllerState;
use crate::rulegen;

pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// A rule-buffer delta computed while the snapshot lock was held, applied
/// after the lock is dropped (the buffer's own lock is a `tokio::sync::Mutex`
/// and can't be acquired while holding the snapshot's `parking_lot` guard).
enum RuleUpdate {
    Ratio(String, Option<RatioRuleGenerator>),
    Regex(String, Option<RegexRuleGenerator>),
}

pub async fn run(orchestrator: &dyn OrchestratorClient, state: &ControllerState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let pods = match orchestrator.get_all_pods().await {
            Ok(pods) => pods,
            Err(err) => {
                error!("[RECONCILE] fail to poll pods: {err}");
                continue;
            }
        };
        let (services, service_pods) = match orchestrator.get_all_services().await {
            Ok(pair) => pair,
            Err(err) => {
                error!("[RECONCILE] fail to poll services: {err}");
                continue;
            }
        };
        reconcile_once(state, pods, services, service_pods).await;
    }
}

/// Runs one reconcile pass against an already-polled pod/service snapshot.
/// Split out from `run` so it can be exercised directly in tests without a
/// live orchestrator poll. The diff and rule regeneration run synchronously
/// under the snapshot lock; the resulting sandbox/rule deltas are staged
/// into the buffers only after that lock is dropped.
pub async fn reconcile_once(state: &ControllerState, pods: Vec<Pod>, services: Vec<Service>, mut service_pods: Vec<Vec<String>>) {
    let (new_sandbox_infos, rule_updates) = reconcile_snapshot(state, pods, services, &mut service_pods);

    for info in new_sandbox_infos {
        state.proxy_buffer.add_sandbox(info).await;
    }
    for update in rule_updates {
        match update {
            RuleUpdate::Ratio(name, generator) => state.rule_buffer.set_ratio_rule(&name, generator).await,
            RuleUpdate::Regex(name, generator) => state.rule_buffer.set_regex_rule(&name, generator).await,
        }
    }
}

fn reconcile_snapshot(state: &ControllerState, pods: Vec<Pod>, services: Vec<Service>, service_pods: &mut [Vec<String>]) -> (Vec<SandboxInfo>, Vec<RuleUpdate>) {
    let mut snapshot = state.snapshot.lock();

    // --- pod diff ---
    let mut new_sandbox_infos = Vec::new();
    let mut current_pods = BTreeMap::new();
    for pod in pods {
        if !pod.is_ready() {
            continue;
        }
        let changed = match snapshot.pods.get(&pod.name) {
            Some(existing) => existing != &pod,
            None => true,
        };
        if changed {
            new_sandbox_infos.push(SandboxInfo {
                sandbox_name: skafos_core::pod_specific_sandbox_name(&pod),
                sandbox_ip: pod.pod_ip.clone(),
                host_ip: pod.host_ip.clone(),
            });
        }
        current_pods.insert(pod.name.clone(), pod);
    }
    snapshot.pods = current_pods;

    // --- service diff ---
    let mut services_to_update_rule = Vec::new();
    let mut current_services = BTreeMap::new();
    let mut current_service_to_pods = BTreeMap::new();
    let mut remaining_old_services: BTreeMap<String, Service> = std::mem::take(&mut snapshot.services);

    for (i, service) in services.into_iter().enumerate() {
        service_pods[i].sort();
        if let Some(existing) = remaining_old_services.remove(&service.name) {
            let pods_changed = snapshot.services_to_pods.get(&service.name).map(|old| old != &service_pods[i]).unwrap_or(true);
            if existing != service || pods_changed {
                services_to_update_rule.push(service.name.clone());
            }
        }
        current_service_to_pods.insert(service.name.clone(), service_pods[i].clone());
        current_services.insert(service.name.clone(), service);
    }

    // Services present before but absent now: drop their rules.
    let mut deleted_service_rule_types: BTreeMap<String, RuleMeta> = BTreeMap::new();
    for service_name in remaining_old_services.keys() {
        if let Some(rule_meta) = snapshot.service_to_rule.remove(service_name) {
            match rule_meta.kind {
                Kind::Ratio => {
                    snapshot.ratio_rules.remove(&rule_meta.name);
                }
                Kind::Regex => {
                    snapshot.regex_rules.remove(&rule_meta.name);
                }
            }
            deleted_service_rule_types.insert(service_name.clone(), rule_meta);
            services_to_update_rule.push(service_name.clone());
        }
    }

    snapshot.services = current_services;
    snapshot.services_to_pods = current_service_to_pods;

    // --- regenerate rules to stage ---
    let mut rule_updates = Vec::new();
    for service_name in services_to_update_rule {
        match snapshot.service_to_rule.get(&service_name).cloned() {
            Some(rule_meta) => match rule_meta.kind {
                Kind::Ratio => {
                    let rule = snapshot
                        .ratio_rules
                        .get(&rule_meta.name)
                        .unwrap_or_else(|| panic!("expect ratio rule {} for service {service_name}", rule_meta.name))
                        .clone();
                    let (service, pods) = snapshot.get_service_and_pods(&service_name).unwrap_or_else(|_| panic!("expect service {service_name}"));
                    let generator = rulegen::generate_ratio_rule(&rule, service, &pods);
                    rule_updates.push(RuleUpdate::Ratio(rule_meta.name, Some(generator)));
                }
                Kind::Regex => {
                    let rule = snapshot
                        .regex_rules
                        .get(&rule_meta.name)
                        .unwrap_or_else(|| panic!("expect regex rule {} for service {service_name}", rule_meta.name))
                        .clone();
                    let (service, pods) = snapshot.get_service_and_pods(&service_name).unwrap_or_else(|_| panic!("expect service {service_name}"));
                    let generator = rulegen::generate_regex_rule(&rule, service, &pods);
                    rule_updates.push(RuleUpdate::Regex(rule_meta.name, Some(generator)));
                }
            },
            None => {
                if let Some(rule_meta) = deleted_service_rule_types.get(&service_name) {
                    match rule_meta.kind {
                        Kind::Ratio => rule_updates.push(RuleUpdate::Ratio(rule_meta.name.clone(), None)),
                        Kind::Regex => rule_updates.push(RuleUpdate::Regex(rule_meta.name.clone(), None)),
                    }
                    info!("[RECONCILE] service {service_name} deleted, rule {} removed", rule_meta.name);
                }
            }
        }
    }

    debug!("[RECONCILE] tick complete: {} pod(s), {} service(s)", snapshot.pods.len(), snapshot.services.len());
    (new_sandbox_infos, rule_updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skafos_core::{PodPhase, PortPair, RatioRule, RatioSpec};

    fn pod(name: &str, ip: &str, host: &str) -> Pod {
        Pod { name: name.into(), uid: name.into(), phase: PodPhase::Ready, pod_ip: ip.into(), host_ip: host.into(), labels: Default::default() }
    }

    fn service() -> Service {
        Service { name: "svc".into(), cluster_ip: "10.0.0.1".into(), ports: vec![PortPair { port: 80, target_port: 8080 }] }
    }

    #[tokio::test]
    async fn new_ready_pod_is_staged_into_proxy_buffer() {
        let state = ControllerState::new();
        state.agent_manager.add_agent("10.0.0.9", 15000, Default::default(), Default::default(), &state.rule_buffer, &state.proxy_buffer).await;

        reconcile_once(&state, vec![pod("pod-1", "10.1.1.1", "10.0.0.9")], vec![], vec![]).await;

        assert!(!state.proxy_buffer.is_empty_for_test("10.0.0.9").await);
    }

    #[tokio::test]
    async fn second_identical_tick_writes_nothing_new() {
        let state = ControllerState::new();
        state.agent_manager.add_agent("10.0.0.9", 15000, Default::default(), Default::default(), &state.rule_buffer, &state.proxy_buffer).await;
        reconcile_once(&state, vec![pod("pod-1", "10.1.1.1", "10.0.0.9")], vec![], vec![]).await;
        // Drain so a second identical tick can be distinguished from a re-add.
        state.proxy_buffer.reset_agent_buffer("10.0.0.9").await;

        reconcile_once(&state, vec![pod("pod-1", "10.1.1.1", "10.0.0.9")], vec![], vec![]).await;

        assert!(state.proxy_buffer.is_empty_for_test("10.0.0.9").await);
    }

    #[tokio::test]
    async fn deleting_a_ruled_service_stages_a_nil_entry() {
        let state = ControllerState::new();
        state.agent_manager.add_agent("10.0.0.9", 15000, Default::default(), Default::default(), &state.rule_buffer, &state.proxy_buffer).await;

        {
            let mut snapshot = state.snapshot.lock();
            snapshot.services.insert("svc".to_string(), service());
            snapshot.services_to_pods.insert("svc".to_string(), vec![]);
        }
        let rule = RatioRule {
            meta: skafos_core::RuleMeta { kind: Kind::Ratio, name: "R".into() },
            spec: RatioSpec { service_name: "svc".into(), ratio: 50, selector: Default::default() },
        };
        state.apply_ratio_rule(rule).await.unwrap();
        state.rule_buffer.reset_agent_buffer("10.0.0.9").await;

        // Orchestrator now reports no services at all.
        reconcile_once(&state, vec![], vec![], vec![]).await;

        assert!(state.rule_buffer.is_nil_for_test("10.0.0.9", "R").await);
        let snapshot = state.snapshot.lock();
        assert!(!snapshot.ratio_rules.contains_key("R"));
        assert!(!snapshot.service_to_rule.contains_key("svc"));
    }
}
