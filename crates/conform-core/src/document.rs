//! Documents under validation.
//!
//! A document is an ordered mapping from section name to section value. The
//! representation enforces nothing beyond "the root is a mapping"; whether a
//! document conforms to a template is decided by the validator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::patterns::is_field_path;

/// Errors that can occur when constructing a document.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document root must be a mapping, found {0}")]
    NotAMapping(&'static str),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// An ordered mapping of named sections.
///
/// Documents are values: every operation that changes content returns a new
/// document and leaves the receiver untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    sections: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON value whose root is an object.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(sections) => Ok(Self { sections }),
            other => Err(DocumentError::NotAMapping(type_name(&other))),
        }
    }

    /// Parse a document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a document from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Get a section by name.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Check if a section is present.
    pub fn contains_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Iterate over sections in document order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the document has no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Return a copy of this document with one section set.
    ///
    /// An existing section keeps its position; a new one is appended.
    pub fn with_section(&self, name: impl Into<String>, value: Value) -> Self {
        let mut sections = self.sections.clone();
        sections.insert(name.into(), value);
        Self { sections }
    }

    /// Resolve a field path inside a section.
    pub fn lookup(&self, section: &str, path: &FieldPath) -> Option<&Value> {
        self.section(section).and_then(|value| path.resolve(value))
    }

    /// Borrow the underlying mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.sections
    }

    /// Convert into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.sections)
    }

    /// Serialize to compact JSON, keeping key order.
    ///
    /// Key order is part of a document's identity: issues for unknown
    /// sections are reported in document order.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.sections).unwrap_or_default()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(sections: Map<String, Value>) -> Self {
        Self { sections }
    }
}

/// A dotted path to a field, relative to the section that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    /// Parse a dotted path such as `key_metrics.metrics`.
    pub fn parse(path: impl Into<String>) -> Result<Self, String> {
        let path = path.into();
        if is_field_path(&path) {
            Ok(Self(path))
        } else {
            Err(format!("Invalid field path: '{}'", path))
        }
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the path names a direct child of the section.
    pub fn is_top_level(&self) -> bool {
        !self.0.contains('.')
    }

    /// Walk the path through nested mappings.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments()
            .try_fold(value, |current, segment| current.as_object()?.get(segment))
    }

    /// Qualify the path with its section name: `section.path`.
    pub fn qualified(&self, section: &str) -> String {
        format!("{}.{}", section, self.0)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable name of a JSON value's type.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Whether a present value carries no content.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
