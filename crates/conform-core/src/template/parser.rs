//! Template parsing from YAML/JSON.
//!
//! Parsing runs in three stages: the raw value is checked against the
//! embedded JSON Schema, deserialized, and then checked for the rules a
//! schema cannot express (weight sum, unique names, range ordering, default
//! types).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_template_schema;
use crate::document::FieldPath;

/// Allowed deviation of a template's weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Errors that can occur when loading templates.
///
/// These are the only hard failures in the crate: a template that fails to
/// load is surfaced immediately and never retried.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template '{template}' section weights sum to {sum}, expected 1.0")]
    InvalidWeights { template: String, sum: f64 },

    #[error("Invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Template failed schema validation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Template registered twice: {0}")]
    DuplicateTemplate(String),

    #[error("Failed to read template file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Expected type of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    List,
    Object,
    Any,
}

impl FieldType {
    /// Check whether a value has this type. `null` never matches.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => !value.is_null(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Number | FieldType::Integer)
    }
}

/// Declared type of a section's root value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootType {
    #[default]
    Object,
    List,
}

impl RootType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            RootType::Object => value.is_object(),
            RootType::List => value.is_array(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RootType::Object => "object",
            RootType::List => "list",
        }
    }
}

fn default_true() -> bool {
    true
}

/// A field a section is expected to carry.
///
/// In an object-rooted section the path is relative to the section; in a
/// list-rooted section it is relative to each entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: FieldPath,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Optional fields are type-checked when present but never counted
    /// toward completeness.
    #[serde(default = "default_true")]
    pub required: bool,

    /// Safe structural placeholder used by local repair. Never numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Fields checked on every entry of a list-typed field, with paths
    /// relative to the entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<FieldSpec>,
}

impl FieldSpec {
    /// Find the spec for a location inside one section value.
    ///
    /// Locations below a list field carry the entry index, as in
    /// `profiles.0.name`.
    pub fn find<'s>(fields: &'s [FieldSpec], location: &str) -> Option<&'s FieldSpec> {
        if let Some(spec) = fields.iter().find(|f| f.path.as_str() == location) {
            return Some(spec);
        }
        fields.iter().filter(|f| !f.entries.is_empty()).find_map(|f| {
            let rest = location.strip_prefix(f.path.as_str())?.strip_prefix('.')?;
            let (index, rest) = rest.split_once('.')?;
            index.parse::<usize>().ok()?;
            FieldSpec::find(&f.entries, rest)
        })
    }
}

/// Allowed count range for one sub-group of a partitioned list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRule {
    pub field: FieldPath,
    pub min: usize,
    pub max: usize,
}

/// Inclusive count range for a list-valued field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardinalityRule {
    /// The counted list. Absent for list-rooted sections (the root is
    /// counted) and for partitioned lists (the partitions are summed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldPath>,

    pub min: usize,
    pub max: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionRule>,
}

/// Values of `field` must be pairwise distinct across list entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniquenessRule {
    /// Key inside each entry.
    pub field: FieldPath,

    /// The list whose entries are compared. Defaults to the entries counted
    /// by the section's cardinality rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<FieldPath>,
}

/// Schema for one named section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSchema {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Contribution to the overall score.
    pub weight: f64,

    #[serde(rename = "type", default)]
    pub root: RootType,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<CardinalityRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<UniquenessRule>,
}

impl SectionSchema {
    /// Fields counted toward completeness, in declaration order.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Find a field spec by path.
    pub fn field(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.path.as_str() == path)
    }
}

/// A named, ordered set of section schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,

    /// Version of this template (semver-like)
    pub version: String,

    /// Version of the template format (date-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub sections: Vec<SectionSchema>,
}

impl Template {
    /// Parse a template from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a template from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Build a template from an already-parsed value.
    pub fn from_value(value: Value) -> Result<Self, ConfigurationError> {
        validate_template_schema(&value).map_err(ConfigurationError::SchemaViolation)?;
        let template: Template = serde_json::from_value(value)?;
        template.validate()?;
        Ok(template)
    }

    /// Parse a template file, choosing the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Get a section schema by name.
    pub fn section(&self, name: &str) -> Option<&SectionSchema> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Sum of all section weights.
    pub fn total_weight(&self) -> f64 {
        self.sections.iter().map(|s| s.weight).sum()
    }

    /// Check the rules the JSON Schema cannot express.
    ///
    /// Called by every parse path; call it directly for templates built in
    /// code.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidTemplate {
            template: self.name.clone(),
            reason,
        };

        if self.sections.is_empty() {
            return Err(invalid("template declares no sections".to_string()));
        }

        if let Some(version) = &self.schema_version {
            NaiveDate::parse_from_str(version, "%Y-%m-%d")
                .map_err(|e| invalid(format!("schema_version '{}': {}", version, e)))?;
        }

        let mut seen = HashSet::new();
        for section in &self.sections {
            if !seen.insert(section.name.as_str()) {
                return Err(invalid(format!("duplicate section '{}'", section.name)));
            }
            if !(section.weight > 0.0) {
                return Err(invalid(format!(
                    "section '{}' has non-positive weight {}",
                    section.name, section.weight
                )));
            }
            validate_section(section).map_err(invalid)?;
        }

        let sum = self.total_weight();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigurationError::InvalidWeights {
                template: self.name.clone(),
                sum,
            });
        }

        Ok(())
    }
}

fn validate_section(section: &SectionSchema) -> Result<(), String> {
    let name = &section.name;

    validate_fields(name, &section.fields)?;

    if let Some(rule) = &section.cardinality {
        if rule.min > rule.max {
            return Err(format!(
                "section '{}' cardinality min {} exceeds max {}",
                name, rule.min, rule.max
            ));
        }
        for partition in &rule.partitions {
            if partition.min > partition.max {
                return Err(format!(
                    "section '{}' partition '{}' min {} exceeds max {}",
                    name, partition.field, partition.min, partition.max
                ));
            }
        }
        match section.root {
            RootType::List if rule.field.is_some() || !rule.partitions.is_empty() => {
                return Err(format!(
                    "list section '{}' counts its root; cardinality cannot name a field",
                    name
                ));
            }
            RootType::Object if rule.field.is_none() && rule.partitions.is_empty() => {
                return Err(format!(
                    "section '{}' cardinality must name a field or partitions",
                    name
                ));
            }
            _ => {}
        }
    }

    for rule in &section.unique {
        match section.root {
            RootType::List if rule.list.is_some() => {
                return Err(format!(
                    "list section '{}' uniqueness applies to its root; 'list' is not allowed",
                    name
                ));
            }
            RootType::Object if rule.list.is_none() && section.cardinality.is_none() => {
                return Err(format!(
                    "uniqueness on '{}.{}' needs a 'list' or a cardinality rule",
                    name, rule.field
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

fn validate_fields(scope: &str, fields: &[FieldSpec]) -> Result<(), String> {
    let mut paths = HashSet::new();
    for field in fields {
        if !paths.insert(field.path.as_str()) {
            return Err(format!("section '{}' declares field '{}' twice", scope, field.path));
        }
        if let Some(default) = &field.default {
            if field.field_type.is_numeric() || default.is_number() {
                return Err(format!(
                    "field '{}.{}' declares a numeric default",
                    scope, field.path
                ));
            }
            if !field.field_type.matches(default) {
                return Err(format!(
                    "default for '{}.{}' is not a {}",
                    scope,
                    field.path,
                    field.field_type.name()
                ));
            }
        }
        if !field.entries.is_empty() {
            if field.field_type != FieldType::List {
                return Err(format!(
                    "field '{}.{}' declares entries but is not a list",
                    scope, field.path
                ));
            }
            validate_fields(&format!("{}.{}", scope, field.path), &field.entries)?;
        }
    }
    Ok(())
}
