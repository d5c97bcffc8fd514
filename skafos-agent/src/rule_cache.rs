//! Incremental view of the rules pushed to this node, so a newly-created
//! sidecar proxy can catch up immediately without waiting for the next
//! controller tick.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use skafos_core::{Config, RatioRuleGenerator, RegexRuleGenerator};

#[derive(Default)]
struct Inner {
    ratio_rules: BTreeMap<String, RatioRuleGenerator>,
    regex_rules: BTreeMap<String, RegexRuleGenerator>,
}

pub struct RuleGeneratorCache {
    inner: RwLock<Inner>,
}

impl RuleGeneratorCache {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Applies one merged config push, deleting rules whose wire value is
    /// `None` and upserting the rest. Held under a single write lock for
    /// the whole operation.
    pub fn apply(&self, config: &Config) {
        let mut inner = self.inner.write();
        for (name, maybe_rule) in &config.ratio_rules {
            match maybe_rule {
                Some(rule) => {
                    inner.ratio_rules.insert(name.clone(), rule.clone());
                }
                None => {
                    inner.ratio_rules.remove(name);
                    inner.regex_rules.remove(name);
                }
            }
        }
        for (name, maybe_rule) in &config.regex_rules {
            match maybe_rule {
                Some(rule) => {
                    inner.regex_rules.insert(name.clone(), rule.clone());
                }
                None => {
                    inner.ratio_rules.remove(name);
                    inner.regex_rules.remove(name);
                }
            }
        }
    }

    pub fn has_rules(&self) -> bool {
        let inner = self.inner.read();
        !inner.ratio_rules.is_empty() || !inner.regex_rules.is_empty()
    }

    /// Snapshots the merged view as a wire `Config`, ready to push to a
    /// proxy (new or existing).
    pub fn dump_config(&self) -> Config {
        let inner = self.inner.read();
        Config {
            ratio_rules: inner.ratio_rules.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect(),
            regex_rules: inner.regex_rules.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect(),
        }
    }
}

impl Default for RuleGeneratorCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as BMap;

    fn ratio_gen() -> RatioRuleGenerator {
        RatioRuleGenerator {
            service_ip: "10.0.0.1".into(),
            port_mapping: BMap::from([(80, 80)]),
            ratio: 50,
            proxied_ips: vec!["10.1.1.1".into()],
            other_ips: vec!["10.1.1.2".into()],
        }
    }

    #[test]
    fn delete_removes_from_both_maps() {
        let cache = RuleGeneratorCache::new();
        let mut ratio_rules = BMap::new();
        ratio_rules.insert("R".to_string(), Some(ratio_gen()));
        cache.apply(&Config { ratio_rules, regex_rules: BMap::new() });
        assert!(cache.has_rules());

        let mut delete = BMap::new();
        delete.insert("R".to_string(), None);
        cache.apply(&Config { ratio_rules: delete, regex_rules: BMap::new() });
        assert!(!cache.has_rules());
    }

    #[test]
    fn dump_config_reflects_latest_upsert() {
        let cache = RuleGeneratorCache::new();
        let mut ratio_rules = BMap::new();
        ratio_rules.insert("R".to_string(), Some(ratio_gen()));
        cache.apply(&Config { ratio_rules, regex_rules: BMap::new() });

        let dumped = cache.dump_config();
        assert_eq!(dumped.ratio_rules.len(), 1);
        assert!(dumped.ratio_rules.get("R").unwrap().is_some());
    }
}
