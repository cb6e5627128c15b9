//! Built-in redaction patterns.
//!
//! Form values matching any of these are masked before a `form_submit`
//! event leaves the client.

use regex::Regex;
use tracing::warn;

/// A compiled redaction pattern.
#[derive(Debug, Clone)]
pub struct RedactionPattern {
    /// Name of the pattern for identification.
    pub name: &'static str,

    /// Description of what this pattern matches.
    pub description: &'static str,

    regex: Regex,
}

impl RedactionPattern {
    /// Compile a pattern; `None` if the regex is invalid.
    #[must_use]
    pub fn new(name: &'static str, description: &'static str, pattern: &str) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(regex) => Some(Self {
                name,
                description,
                regex,
            }),
            Err(e) => {
                warn!(name, error = %e, "Skipping invalid redaction pattern");
                None
            }
        }
    }

    /// Wrap an already compiled regex.
    #[must_use]
    pub fn from_regex(name: &'static str, description: &'static str, regex: Regex) -> Self {
        Self {
            name,
            description,
            regex,
        }
    }

    /// Check if the value matches this pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Replace every match with `placeholder`.
    #[must_use]
    pub fn redact(&self, value: &str, placeholder: &str) -> String {
        self.regex.replace_all(value, placeholder).into_owned()
    }
}

/// Get all built-in redaction patterns.
#[must_use]
pub fn builtin_patterns() -> Vec<RedactionPattern> {
    [
        (
            "credit_card",
            "Credit card numbers (Visa, MasterCard, Amex, Discover), optionally grouped",
            r"\b(?:4\d{3}|5[1-5]\d{2}|6(?:011|5\d{2}))(?:[- ]?\d{4}){3}\b|\b3[47]\d{2}[- ]?\d{6}[- ]?\d{5}\b",
        ),
        ("ssn", "US Social Security Numbers", r"\b\d{3}-\d{2}-\d{4}\b"),
        (
            "api_key",
            "API key and secret assignments",
            r#"(?i)(api[_-]?key|apikey|api[_-]?secret|access[_-]?token)\s*[:=]\s*['"]?[a-zA-Z0-9_-]{16,}['"]?"#,
        ),
        (
            "bearer_token",
            "Bearer authentication tokens",
            r"(?i)bearer\s+[a-zA-Z0-9_.=-]{8,}",
        ),
        (
            "aws_key",
            "AWS access key IDs",
            r"\b(?:AKIA|ABIA|ACCA|ASIA)[A-Z0-9]{16}\b",
        ),
        (
            "github_token",
            "GitHub personal access tokens and app tokens",
            r"\b(?:ghp|gho|ghu|ghs|ghr)_[a-zA-Z0-9]{36}\b",
        ),
        (
            "private_key",
            "PEM-encoded private keys",
            r"-----BEGIN (?:RSA |EC |DSA )?PRIVATE KEY-----",
        ),
    ]
    .into_iter()
    .filter_map(|(name, description, pattern)| RedactionPattern::new(name, description, pattern))
    .collect()
}
