use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The category of a rule object. Rule names are unique across both kinds
/// (see the controller snapshot invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Ratio,
    Regex,
}

/// Metadata common to both rule kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMeta {
    pub kind: Kind,
    pub name: String,
}

/// Specification of a ratio rule: send `ratio` percent of a service's
/// traffic to pods matching `selector`, the rest to everyone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioSpec {
    #[serde(rename = "serviceName")]
    pub service_name: String,
    pub ratio: u32,
    pub selector: BTreeMap<String, String>,
}

/// A rule defining the network traffic of a service in a ratio pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioRule {
    #[serde(flatten)]
    pub meta: RuleMeta,
    pub spec: RatioSpec,
}

/// One header/regex/selector triple within a regex rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub header: String,
    pub regex: String,
    pub selector: BTreeMap<String, String>,
}

/// Specification of a regex rule: route by matching HTTP headers against an
/// ordered list of matchers, first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexSpec {
    #[serde(rename = "serviceName")]
    pub service_name: String,
    pub matchers: Vec<Matcher>,
}

/// A rule defining the network traffic of a service in a regex pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRule {
    #[serde(flatten)]
    pub meta: RuleMeta,
    pub spec: RegexSpec,
}

impl RatioRule {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// `ratio` must be a percentage: in `[0, 100]`.
    pub fn validate(&self) -> Result<(), crate::ValidationError> {
        if self.spec.ratio > 100 {
            return Err(crate::ValidationError::RatioOutOfRange(self.spec.ratio));
        }
        Ok(())
    }
}

impl RegexRule {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Compiles every matcher's regex up front, surfacing the first
    /// compile failure as a validation error (CLI and controller both call
    /// this before accepting the rule).
    pub fn validate(&self) -> Result<(), crate::ValidationError> {
        for matcher in &self.spec.matchers {
            regex::Regex::new(&matcher.regex).map_err(|source| crate::ValidationError::InvalidRegex {
                header: matcher.header.clone(),
                pattern: matcher.regex.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio_rule(ratio: u32) -> RatioRule {
        RatioRule {
            meta: RuleMeta { kind: Kind::Ratio, name: "r1".into() },
            spec: RatioSpec { service_name: "svc".into(), ratio, selector: Default::default() },
        }
    }

    #[test]
    fn ratio_over_100_is_rejected() {
        assert!(ratio_rule(100).validate().is_ok());
        assert!(ratio_rule(101).validate().is_err());
    }

    #[test]
    fn bad_regex_is_rejected_up_front() {
        let rule = RegexRule {
            meta: RuleMeta { kind: Kind::Regex, name: "r2".into() },
            spec: RegexSpec {
                service_name: "svc".into(),
                matchers: vec![Matcher {
                    header: "x-version".into(),
                    regex: "(".into(),
                    selector: Default::default(),
                }],
            },
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn kind_serializes_as_lowercase() {
        let meta = RuleMeta { kind: Kind::Regex, name: "r3".into() };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kind\":\"regex\""));
    }
}
