//! The controller's in-memory snapshot of discovered pods, services, and
//! applied rules. One coarse lock guards the whole snapshot, held for
//! the full diff-and-stage block of a reconcile tick and for the full
//! duration of an Apply*Rule call.

use std::collections::BTreeMap;

use skafos_core::{Kind, Pod, RatioRule, RegexRule, RuleMeta, Service};

use crate::error::ControllerError;

#[derive(Default)]
pub struct Snapshot {
    pub pods: BTreeMap<String, Pod>,
    pub services: BTreeMap<String, Service>,
    pub services_to_pods: BTreeMap<String, Vec<String>>,

    pub ratio_rules: BTreeMap<String, RatioRule>,
    pub regex_rules: BTreeMap<String, RegexRule>,
    pub service_to_rule: BTreeMap<String, RuleMeta>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a service and the pods it selects. Panics if the service
    /// is known but its pod index is missing or references an absent
    /// pod: that is a broken internal invariant, not a user error.
    pub fn get_service_and_pods(&self, service_name: &str) -> Result<(&Service, Vec<&Pod>), ControllerError> {
        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| ControllerError::Validation(skafos_core::ValidationError::UnknownService(service_name.to_string())))?;
        let pod_names = self
            .services_to_pods
            .get(service_name)
            .unwrap_or_else(|| panic!("expect pods for service {service_name}"));
        let pods = pod_names.iter().map(|name| self.pods.get(name).unwrap_or_else(|| panic!("expect pod {name}"))).collect();
        Ok((service, pods))
    }

    /// Checks that a rule name and the service it targets are both free,
    /// per the duplicate-rule and already-ruled invariants.
    pub fn check_rule(&self, rule_name: &str, service_name: &str) -> Result<(), ControllerError> {
        if self.ratio_rules.contains_key(rule_name) || self.regex_rules.contains_key(rule_name) {
            return Err(skafos_core::ValidationError::DuplicateRule(rule_name.to_string()).into());
        }
        if self.service_to_rule.contains_key(service_name) {
            return Err(skafos_core::ValidationError::ServiceAlreadyRuled(service_name.to_string()).into());
        }
        Ok(())
    }

    pub fn all_ratio_generators(&self, rulegen: impl Fn(&RatioRule, &Service, &[&Pod]) -> skafos_core::RatioRuleGenerator) -> BTreeMap<String, skafos_core::RatioRuleGenerator> {
        let mut out = BTreeMap::new();
        for (name, rule) in &self.ratio_rules {
            if let Ok((service, pods)) = self.get_service_and_pods(&rule.spec.service_name) {
                out.insert(name.clone(), rulegen(rule, service, &pods));
            }
        }
        out
    }

    pub fn all_regex_generators(&self, rulegen: impl Fn(&RegexRule, &Service, &[&Pod]) -> skafos_core::RegexRuleGenerator) -> BTreeMap<String, skafos_core::RegexRuleGenerator> {
        let mut out = BTreeMap::new();
        for (name, rule) in &self.regex_rules {
            if let Ok((service, pods)) = self.get_service_and_pods(&rule.spec.service_name) {
                out.insert(name.clone(), rulegen(rule, service, &pods));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_rule_rejects_duplicate_name() {
        let mut snap = Snapshot::new();
        snap.ratio_rules.insert(
            "R".to_string(),
            RatioRule {
                meta: RuleMeta { kind: Kind::Ratio, name: "R".into() },
                spec: skafos_core::RatioSpec { service_name: "svc".into(), ratio: 10, selector: Default::default() },
            },
        );
        assert!(snap.check_rule("R", "other-svc").is_err());
    }

    #[test]
    fn check_rule_rejects_service_already_ruled() {
        let mut snap = Snapshot::new();
        snap.service_to_rule.insert("svc".to_string(), RuleMeta { kind: Kind::Ratio, name: "R".into() });
        assert!(snap.check_rule("R2", "svc").is_err());
    }

    #[test]
    fn check_rule_accepts_fresh_name_and_service() {
        let snap = Snapshot::new();
        assert!(snap.check_rule("R", "svc").is_ok());
    }
}
