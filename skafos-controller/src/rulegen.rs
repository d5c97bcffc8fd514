//! Builds the wire-form rule generators `skafos-agent`/`skafos-proxy`
//! understand from an operator's rule plus the current service/pod
//! snapshot.

use std::collections::BTreeMap;

use skafos_core::{HeaderRegexMatcher, Pod, RatioRuleGenerator, RatioRule, RegexRuleGenerator, RegexRule, Service};

fn port_mapping(service: &Service) -> BTreeMap<u16, u16> {
    service.ports.iter().map(|pair| (pair.port, pair.target_port)).collect()
}

/// Partitions `pods` into `(proxied, other)` IPs by exact label-map
/// equality against `rule.spec.selector`.
pub fn generate_ratio_rule(rule: &RatioRule, service: &Service, pods: &[&Pod]) -> RatioRuleGenerator {
    let mut proxied_ips = Vec::new();
    let mut other_ips = Vec::new();
    for pod in pods {
        if pod.labels == rule.spec.selector {
            proxied_ips.push(pod.pod_ip.clone());
        } else {
            other_ips.push(pod.pod_ip.clone());
        }
    }

    RatioRuleGenerator {
        service_ip: service.cluster_ip.clone(),
        port_mapping: port_mapping(service),
        ratio: rule.spec.ratio,
        proxied_ips,
        other_ips,
    }
}

/// Builds one IP bucket per matcher (first selector match wins per pod)
/// and falls back to `other_ips` for pods matching no matcher's selector.
pub fn generate_regex_rule(rule: &RegexRule, service: &Service, pods: &[&Pod]) -> RegexRuleGenerator {
    let mut matchers: Vec<HeaderRegexMatcher> = rule
        .spec
        .matchers
        .iter()
        .map(|m| HeaderRegexMatcher { header: m.header.clone(), regex: m.regex.clone(), ips: Vec::new() })
        .collect();
    let mut other_ips = Vec::new();

    for pod in pods {
        let mut matched = false;
        for (i, matcher) in rule.spec.matchers.iter().enumerate() {
            if matcher.selector == pod.labels {
                matchers[i].ips.push(pod.pod_ip.clone());
                matched = true;
                break;
            }
        }
        if !matched {
            other_ips.push(pod.pod_ip.clone());
        }
    }

    RegexRuleGenerator { service_ip: service.cluster_ip.clone(), port_mapping: port_mapping(service), matchers, other_ips }
}
