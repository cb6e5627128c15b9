//! Form-field privacy filter.
//!
//! Decides, field by field, whether a submitted form value may be recorded
//! and masks sensitive substrings in the values that are kept.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, trace, warn};

use super::patterns::{builtin_patterns, RedactionPattern};
use crate::config::PrivacyConfig;

/// Field names that are always excluded, whatever the configuration adds.
pub const SENSITIVE_FIELD_NAMES: [&str; 5] = [
    "password",
    "password_confirm",
    "password_confirmation",
    "confirm_password",
    "passwordCheck",
];

/// Placeholder substituted for redacted substrings.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// Outcome of filtering a single form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The field must not be recorded at all.
    Excluded,

    /// The value is safe to record as-is.
    Passed(String),

    /// The value was recorded with sensitive parts replaced.
    Redacted {
        /// The redacted value.
        value: String,

        /// Patterns that matched.
        patterns: Vec<String>,
    },
}

impl FieldOutcome {
    /// The value to record, if any.
    #[must_use]
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Excluded => None,
            Self::Passed(value) | Self::Redacted { value, .. } => Some(value),
        }
    }
}

/// Privacy filter applied to form submissions.
#[derive(Debug, Clone)]
pub struct FormFilter {
    denylist: HashSet<String>,
    redact_enabled: bool,
    patterns: Vec<RedactionPattern>,
}

impl Default for FormFilter {
    fn default() -> Self {
        Self::from_config(&PrivacyConfig::default())
    }
}

impl FormFilter {
    /// Build a filter from configuration.
    ///
    /// Configured field names extend [`SENSITIVE_FIELD_NAMES`]. Invalid extra patterns are skipped with a warning; `Config::validate`
    /// normally rejects them earlier.
    #[must_use]
    pub fn from_config(config: &PrivacyConfig) -> Self {
        let denylist = SENSITIVE_FIELD_NAMES
            .iter()
            .copied()
            .chain(config.denylisted_fields.iter().map(String::as_str))
            .map(normalize_field_name)
            .collect();

        let mut patterns = builtin_patterns();
        for pattern in &config.extra_patterns {
            match Regex::new(pattern) {
                Ok(regex) => patterns.push(RedactionPattern::from_regex(
                    "custom",
                    "Configured redaction pattern",
                    regex,
                )),
                Err(e) => warn!(pattern = %pattern, error = %e, "Invalid custom regex pattern"),
            }
        }

        Self {
            denylist,
            redact_enabled: config.redact_enabled,
            patterns,
        }
    }

    /// Check whether a field name is on the denylist.
    ///
    /// Matching ignores case, underscores and hyphens, so `passwordConfirm`,
    /// `password_confirm` and `password-confirm` are the same name.
    #[must_use]
    pub fn is_denylisted(&self, name: &str) -> bool {
        self.denylist.contains(&normalize_field_name(name))
    }

    /// Decide what to record for one field.
    #[must_use]
    pub fn check_field(&self, name: &str, input_type: Option<&str>, value: &str) -> FieldOutcome {
        let is_password_input = input_type.is_some_and(|t| t.eq_ignore_ascii_case("password"));
        if is_password_input || self.is_denylisted(name) {
            debug!(field = %name, "Excluding sensitive form field");
            return FieldOutcome::Excluded;
        }

        if !self.redact_enabled {
            return FieldOutcome::Passed(value.to_string());
        }

        let mut result = value.to_string();
        let mut matched = Vec::new();
        for pattern in &self.patterns {
            if pattern.matches(&result) {
                result = pattern.redact(&result, REDACTION_PLACEHOLDER);
                matched.push(pattern.name.to_string());
                trace!(field = %name, pattern = %pattern.name, "Form value redacted");
            }
        }

        if matched.is_empty() {
            FieldOutcome::Passed(result)
        } else {
            FieldOutcome::Redacted {
                value: result,
                patterns: matched,
            }
        }
    }
}

fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
