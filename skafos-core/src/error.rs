use thiserror::Error;

/// Validation failures an operator-facing surface must report with a
/// nonzero exit / non-OK status, and must never retry.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    #[error("service {0} already has a rule applied to it")]
    ServiceAlreadyRuled(String),

    #[error("no such service: {0}")]
    UnknownService(String),

    #[error("ratio must be in 0..=100, got {0}")]
    RatioOutOfRange(u32),

    #[error("unsupported rule kind: {0}")]
    UnsupportedKind(String),

    #[error("invalid regex {pattern:?} in matcher for header {header:?}: {source}")]
    InvalidRegex {
        header: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
