use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Serializable form of a ratio rule, shipped from controller to agent to
/// proxy. Regexes and round-robin cursors don't survive a JSON round trip,
/// so everything compiled/stateful is kept out of this type and rebuilt by
/// the proxy on receipt (see `skafos-proxy::engine`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioRuleGenerator {
    pub service_ip: String,
    /// `servicePort -> targetPort`.
    pub port_mapping: BTreeMap<u16, u16>,
    pub ratio: u32,
    pub proxied_ips: Vec<String>,
    pub other_ips: Vec<String>,
}

/// One compiled-on-receipt matcher entry within a regex rule generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRegexMatcher {
    pub header: String,
    pub regex: String,
    pub ips: Vec<String>,
}

/// Serializable form of a regex rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRuleGenerator {
    pub service_ip: String,
    pub port_mapping: BTreeMap<u16, u16>,
    pub matchers: Vec<HeaderRegexMatcher>,
    pub other_ips: Vec<String>,
}

/// The wire payload pushed to an agent (and relayed to every proxy it
/// owns). A `None` value for a rule name means "delete this rule"; the key
/// must still be present so the deletion itself survives serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub ratio_rules: BTreeMap<String, Option<RatioRuleGenerator>>,
    pub regex_rules: BTreeMap<String, Option<RegexRuleGenerator>>,
}

impl Config {
    pub fn is_empty(&self) -> bool {
        self.ratio_rules.is_empty() && self.regex_rules.is_empty()
    }
}
