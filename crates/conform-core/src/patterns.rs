//! Shared text patterns.
//!
//! Field paths in templates and disambiguated labels produced by the local
//! repair pass are both recognised here, so the parser and the repairs agree
//! on one definition of each.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Dotted field path relative to a section: `key_metrics.metrics`.
    pub static ref FIELD_PATH_PATTERN: Regex = Regex::new(
        r"^[A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*$"
    ).unwrap();

    /// Template and section names.
    pub static ref IDENTIFIER_PATTERN: Regex = Regex::new(
        r"^[a-z][a-z0-9_]*$"
    ).unwrap();

    /// A label that already carries a positional suffix: `Trading Multiples (2)`.
    pub static ref LABEL_SUFFIX_PATTERN: Regex = Regex::new(
        r"^(?P<base>.*?)\s\((?P<n>\d+)\)$"
    ).unwrap();
}

/// Check if a string is a well-formed dotted field path.
pub fn is_field_path(path: &str) -> bool {
    FIELD_PATH_PATTERN.is_match(path)
}

/// Check if a string is a valid template or section identifier.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// Strip a positional suffix previously added by label disambiguation.
///
/// `"Trading Multiples (2)"` becomes `"Trading Multiples"`; labels without a
/// suffix are returned unchanged.
pub fn label_base(label: &str) -> &str {
    LABEL_SUFFIX_PATTERN
        .captures(label)
        .and_then(|caps| caps.name("base"))
        .map(|m| m.as_str())
        .unwrap_or(label)
}
