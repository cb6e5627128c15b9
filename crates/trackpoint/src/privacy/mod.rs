//! Privacy filtering for form submissions.
//!
//! Two layers protect what a `form_submit` event may carry:
//!
//! - **Field exclusion**: password inputs, the built-in password and
//!   confirmation names, and any configured names are dropped entirely.
//!
//! - **Value redaction**: remaining values that look like card numbers,
//!   SSNs, API keys or bearer tokens are masked.
//!
//! # Example
//!
//! ```
//! use trackpoint::privacy::{FieldOutcome, FormFilter};
//!
//! let filter = FormFilter::default();
//!
//! assert_eq!(filter.check_field("password", None, "hunter2"), FieldOutcome::Excluded);
//!
//! match filter.check_field("comment", Some("text"), "SSN 123-45-6789") {
//!     FieldOutcome::Redacted { value, .. } => assert_eq!(value, "SSN [REDACTED]"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

mod filter;
mod patterns;

pub use filter::{FieldOutcome, FormFilter, REDACTION_PLACEHOLDER, SENSITIVE_FIELD_NAMES};
pub use patterns::{builtin_patterns, RedactionPattern};
