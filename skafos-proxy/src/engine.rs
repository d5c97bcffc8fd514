//! The compiled, in-memory rule table that decides where a request goes.
//!
//! This module has no I/O: it is pure data plus matching logic, so its
//! routing properties (ratio convergence, round-robin fairness, first-match
//! regex semantics) can be exercised directly with `#[cfg(test)]` tests
//! rather than through a running proxy.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use regex::Regex;
use skafos_core::{Config, HeaderRegexMatcher, RatioRuleGenerator, RegexRuleGenerator};

/// A round-robin cursor over a fixed, non-empty set of IPs. Cursor identity
/// is tied to the compiled rule instance: a fresh `compile` call always
/// produces fresh cursors starting at zero — not reset on swap, but also
/// not carried across a rebuild.
#[derive(Debug)]
struct RoundRobin {
    ips: Vec<String>,
    cursor: AtomicUsize,
}

impl RoundRobin {
    fn new(ips: Vec<String>) -> Option<Self> {
        if ips.is_empty() {
            None
        } else {
            Some(Self { ips, cursor: AtomicUsize::new(0) })
        }
    }

    fn next(&self) -> &str {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.ips.len();
        &self.ips[i]
    }
}

struct CompiledRatioRule {
    name: String,
    service_ip: String,
    port_mapping: BTreeMap<u16, u16>,
    ratio: u32,
    proxied: Option<RoundRobin>,
    other: Option<RoundRobin>,
}

struct CompiledMatcher {
    header: String,
    regex: Regex,
    ips: Option<RoundRobin>,
}

struct CompiledRegexRule {
    name: String,
    service_ip: String,
    port_mapping: BTreeMap<u16, u16>,
    matchers: Vec<CompiledMatcher>,
    other: Option<RoundRobin>,
}

enum CompiledRule {
    Ratio(CompiledRatioRule),
    Regex(CompiledRegexRule),
}

impl CompiledRule {
    fn base_matches(&self, host: &str, port: u16) -> Option<u16> {
        let (service_ip, port_mapping) = match self {
            CompiledRule::Ratio(r) => (&r.service_ip, &r.port_mapping),
            CompiledRule::Regex(r) => (&r.service_ip, &r.port_mapping),
        };
        if host != service_ip {
            return None;
        }
        port_mapping.get(&port).copied()
    }

    /// Attempts a selection for this rule. `None` means "no match / empty
    /// IP set, fall through to the next rule", matching spec semantics
    /// that an empty target set is not a hard error but a fall-through.
    fn select(&self, target_port: u16, headers: &[(String, String)]) -> Option<String> {
        match self {
            CompiledRule::Ratio(r) => {
                let draw: u32 = rand::random::<u32>() % 100;
                let chosen = if draw < r.ratio { r.proxied.as_ref() } else { r.other.as_ref() };
                let ip = chosen?.next().to_string();
                Some(format!("{ip}:{target_port}"))
            }
            CompiledRule::Regex(r) => {
                for matcher in &r.matchers {
                    for (k, v) in headers {
                        if k.eq_ignore_ascii_case(&matcher.header) && matcher.regex.is_match(v) {
                            if let Some(rr) = &matcher.ips {
                                return Some(format!("{}:{}", rr.next(), target_port));
                            }
                        }
                    }
                }
                let ip = r.other.as_ref()?.next().to_string();
                Some(format!("{ip}:{target_port}"))
            }
        }
    }
}

/// An immutable, fully-compiled rule table. Swapped atomically via
/// `arc_swap::ArcSwap` by the config-push path; never mutated in place.
#[derive(Default)]
pub struct CompiledConfig {
    rules: Vec<CompiledRule>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid regex {pattern:?} for header {header:?}: {source}")]
    InvalidRegex { header: String, pattern: String, #[source] source: regex::Error },
}

impl CompiledConfig {
    /// Compiles a wire `Config` into an immutable rule table, preserving
    /// insertion order (ratio rules first, then regex rules, each in the
    /// `BTreeMap`'s key order) since iteration order must be deterministic
    /// under a fixed configuration.
    pub fn compile(config: &Config) -> Result<Self, CompileError> {
        let mut rules = Vec::new();

        for (name, maybe_gen) in &config.ratio_rules {
            let Some(gen) = maybe_gen else { continue };
            rules.push(CompiledRule::Ratio(compile_ratio(name, gen)));
        }

        for (name, maybe_gen) in &config.regex_rules {
            let Some(gen) = maybe_gen else { continue };
            rules.push(CompiledRule::Regex(compile_regex(name, gen)?));
        }

        Ok(Self { rules })
    }

    /// Resolves the destination for a request with the given `Host` header
    /// value and request headers. Never fails: an unparseable port is the
    /// caller's responsibility to reject (502) before calling `lookup`; an
    /// empty rule table, or no rule matching, returns `host:port` unchanged.
    pub fn lookup(&self, host: &str, port: u16, headers: &[(String, String)]) -> String {
        for rule in &self.rules {
            let Some(target_port) = rule.base_matches(host, port) else { continue };
            if let Some(dest) = rule.select(target_port, headers) {
                return dest;
            }
        }
        format!("{host}:{port}")
    }
}

fn compile_ratio(name: &str, gen: &RatioRuleGenerator) -> CompiledRatioRule {
    CompiledRatioRule {
        name: name.to_string(),
        service_ip: gen.service_ip.clone(),
        port_mapping: gen.port_mapping.clone(),
        ratio: gen.ratio,
        proxied: RoundRobin::new(gen.proxied_ips.clone()),
        other: RoundRobin::new(gen.other_ips.clone()),
    }
}

fn compile_regex(name: &str, gen: &RegexRuleGenerator) -> Result<CompiledRegexRule, CompileError> {
    let mut matchers = Vec::with_capacity(gen.matchers.len());
    for m in &gen.matchers {
        matchers.push(compile_matcher(m)?);
    }
    Ok(CompiledRegexRule {
        name: name.to_string(),
        service_ip: gen.service_ip.clone(),
        port_mapping: gen.port_mapping.clone(),
        matchers,
        other: RoundRobin::new(gen.other_ips.clone()),
    })
}

fn compile_matcher(m: &HeaderRegexMatcher) -> Result<CompiledMatcher, CompileError> {
    let regex = Regex::new(&m.regex).map_err(|source| CompileError::InvalidRegex {
        header: m.header.clone(),
        pattern: m.regex.clone(),
        source,
    })?;
    Ok(CompiledMatcher { header: m.header.clone(), regex, ips: RoundRobin::new(m.ips.clone()) })
}

/// Parses a `Host` header value into `(host, port)`. Port defaults to 80
/// when absent; an unparseable port is reported to the caller so it can
/// reject the request with a 502, per the forwarding pipeline's contract.
pub fn parse_host_port(host_header: &str) -> Result<(String, u16), String> {
    match host_header.rsplit_once(':') {
        Some((host, port_str)) => {
            let port: u16 =
                port_str.parse().map_err(|_| format!("invalid request port: {port_str}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((host_header.to_string(), 80)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio_config(ratio: u32, proxied: Vec<&str>, other: Vec<&str>) -> Config {
        let mut ratio_rules = BTreeMap::new();
        ratio_rules.insert(
            "R".to_string(),
            Some(RatioRuleGenerator {
                service_ip: "10.0.0.1".into(),
                port_mapping: BTreeMap::from([(80, 80)]),
                ratio,
                proxied_ips: proxied.into_iter().map(String::from).collect(),
                other_ips: other.into_iter().map(String::from).collect(),
            }),
        );
        Config { ratio_rules, regex_rules: BTreeMap::new() }
    }

    #[test]
    fn pass_through_default() {
        let compiled = CompiledConfig::compile(&Config::default()).unwrap();
        assert_eq!(compiled.lookup("10.0.0.1", 80, &[]), "10.0.0.1:80");
        assert_eq!(compiled.lookup("example.test", 8080, &[]), "example.test:8080");
    }

    #[test]
    fn round_robin_fairness_at_ratio_100() {
        let config = ratio_config(100, vec!["10.1.1.1", "10.1.1.2", "10.1.1.3"], vec![]);
        let compiled = CompiledConfig::compile(&config).unwrap();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for _ in 0..3000 {
            let dest = compiled.lookup("10.0.0.1", 80, &[]);
            *counts.entry(dest).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert_eq!(*count, 1000);
        }
    }

    #[test]
    fn round_robin_wraps_in_insertion_order() {
        let config = ratio_config(100, vec!["10.1.1.1", "10.1.1.2"], vec![]);
        let compiled = CompiledConfig::compile(&config).unwrap();
        assert_eq!(compiled.lookup("10.0.0.1", 80, &[]), "10.1.1.1:80");
        assert_eq!(compiled.lookup("10.0.0.1", 80, &[]), "10.1.1.2:80");
        assert_eq!(compiled.lookup("10.0.0.1", 80, &[]), "10.1.1.1:80");
    }

    #[test]
    fn ratio_distribution_converges() {
        let config = ratio_config(30, vec!["10.1.1.1"], vec!["10.1.1.2"]);
        let compiled = CompiledConfig::compile(&config).unwrap();

        let n = 20_000;
        let mut hits = 0;
        for _ in 0..n {
            if compiled.lookup("10.0.0.1", 80, &[]) == "10.1.1.1:80" {
                hits += 1;
            }
        }
        let p = 0.30_f64;
        let mean = n as f64 * p;
        let stddev = (n as f64 * p * (1.0 - p)).sqrt();
        let diff = (hits as f64 - mean).abs();
        assert!(diff < 3.0 * stddev, "hits={hits} mean={mean} stddev={stddev}");
    }

    #[test]
    fn regex_first_match_wins_and_is_case_insensitive_on_header_name() {
        let mut regex_rules = BTreeMap::new();
        regex_rules.insert(
            "R".to_string(),
            Some(RegexRuleGenerator {
                service_ip: "10.0.0.1".into(),
                port_mapping: BTreeMap::from([(80, 80)]),
                matchers: vec![
                    HeaderRegexMatcher {
                        header: "x-version".into(),
                        regex: "^canary$".into(),
                        ips: vec!["10.2.2.1".into()],
                    },
                    HeaderRegexMatcher {
                        header: "x-version".into(),
                        regex: "^.*$".into(),
                        ips: vec!["10.2.2.2".into()],
                    },
                ],
                other_ips: vec!["10.2.2.9".into()],
            }),
        );
        let config = Config { ratio_rules: BTreeMap::new(), regex_rules };
        let compiled = CompiledConfig::compile(&config).unwrap();

        let headers = vec![("X-Version".to_string(), "canary".to_string())];
        assert_eq!(compiled.lookup("10.0.0.1", 80, &headers), "10.2.2.1:80");
    }

    #[test]
    fn regex_falls_back_to_other_ips_when_no_matcher_hits() {
        let mut regex_rules = BTreeMap::new();
        regex_rules.insert(
            "R".to_string(),
            Some(RegexRuleGenerator {
                service_ip: "10.0.0.1".into(),
                port_mapping: BTreeMap::from([(80, 80)]),
                matchers: vec![HeaderRegexMatcher {
                    header: "x-version".into(),
                    regex: "^canary$".into(),
                    ips: vec!["10.2.2.1".into()],
                }],
                other_ips: vec!["10.2.2.9".into()],
            }),
        );
        let config = Config { ratio_rules: BTreeMap::new(), regex_rules };
        let compiled = CompiledConfig::compile(&config).unwrap();
        assert_eq!(compiled.lookup("10.0.0.1", 80, &[]), "10.2.2.9:80");
    }

    #[test]
    fn unknown_host_is_pass_through() {
        let config = ratio_config(100, vec!["10.1.1.1"], vec![]);
        let compiled = CompiledConfig::compile(&config).unwrap();
        assert_eq!(compiled.lookup("10.9.9.9", 80, &[]), "10.9.9.9:80");
    }

    #[test]
    fn compile_rejects_bad_regex() {
        let mut regex_rules = BTreeMap::new();
        regex_rules.insert(
            "R".to_string(),
            Some(RegexRuleGenerator {
                service_ip: "10.0.0.1".into(),
                port_mapping: BTreeMap::from([(80, 80)]),
                matchers: vec![HeaderRegexMatcher {
                    header: "x-version".into(),
                    regex: "(".into(),
                    ips: vec!["10.2.2.1".into()],
                }],
                other_ips: vec![],
            }),
        );
        let config = Config { ratio_rules: BTreeMap::new(), regex_rules };
        assert!(CompiledConfig::compile(&config).is_err());
    }

    #[test]
    fn parse_host_port_defaults_to_80() {
        assert_eq!(parse_host_port("10.0.0.1").unwrap(), ("10.0.0.1".to_string(), 80));
        assert_eq!(parse_host_port("10.0.0.1:8080").unwrap(), ("10.0.0.1".to_string(), 8080));
    }

    #[test]
    fn parse_host_port_rejects_unparseable_port() {
        assert!(parse_host_port("10.0.0.1:abc").is_err());
    }
}
