//! Template conformance validation.
//!
//! [`SchemaValidator`] walks a document section by section in template order
//! and produces a [`ValidationReport`]. Validation is a pure function of the
//! document and the template: it never fails, never mutates its inputs and
//! yields identical reports for identical inputs. Every defect becomes an
//! issue in the report.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::document::{is_empty_value, type_name, Document, FieldPath};
use crate::report::{IssueKind, SectionScore, ValidationIssue, ValidationReport};
use crate::scoring::{
    aggregate, cardinality_factor, completeness_ratio, duplicate_factor, mean_factor,
    section_score,
};
use crate::template::{
    CardinalityRule, FieldSpec, RootType, SectionSchema, Template, UniquenessRule,
};

/// Validates documents against one template.
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator<'t> {
    template: &'t Template,
}

impl<'t> SchemaValidator<'t> {
    pub fn new(template: &'t Template) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &'t Template {
        self.template
    }

    /// Validate a document.
    ///
    /// # Returns
    ///
    /// A report whose `overall_score` is the weighted aggregate of the
    /// section scores. Sections the template does not declare are reported
    /// as `UnknownSection` and do not affect any score.
    pub fn validate(&self, document: &Document) -> ValidationReport {
        let mut findings = Findings::default();
        let mut section_scores = Vec::with_capacity(self.template.sections.len());

        for schema in &self.template.sections {
            let score = match document.section(&schema.name) {
                None => {
                    absent_section(schema, &mut findings);
                    zero_score(schema)
                }
                Some(value) if !schema.root.matches(value) => {
                    findings.invalid(
                        &schema.name,
                        None,
                        format!(
                            "section must be {} {}, found {}",
                            article(schema.root.name()),
                            schema.root.name(),
                            type_name(value)
                        ),
                    );
                    zero_score(schema)
                }
                Some(value) => score_section(schema, value, &mut findings),
            };

            tracing::debug!(
                template = %self.template.name,
                section = %schema.name,
                score = score.score,
                completeness = score.completeness,
                cardinality_factor = score.cardinality_factor,
                "section scored"
            );
            section_scores.push(score);
        }

        for (name, _) in document.sections() {
            if self.template.section(name).is_none() {
                findings.issues.push(ValidationIssue::new(
                    name,
                    None,
                    IssueKind::UnknownSection,
                    format!("section is not defined by template '{}'", self.template.name),
                ));
            }
        }

        let overall_score = aggregate(section_scores.iter().map(|s| (s.score, s.weight)));

        ValidationReport {
            template: self.template.name.clone(),
            template_version: self.template.version.clone(),
            overall_score,
            section_scores,
            issues: findings.issues,
            missing_fields: findings.missing,
            invalid_types: findings.invalid,
            empty_fields: findings.empty,
            approximate: BTreeSet::new(),
        }
    }
}

#[derive(Default)]
struct Findings {
    issues: Vec<ValidationIssue>,
    missing: BTreeSet<String>,
    invalid: BTreeSet<String>,
    empty: BTreeSet<String>,
}

impl Findings {
    fn missing(&mut self, section: &str, field: Option<String>, message: String) {
        self.missing.insert(qualify(section, field.as_deref()));
        self.issues
            .push(ValidationIssue::new(section, field, IssueKind::MissingField, message));
    }

    fn invalid(&mut self, section: &str, field: Option<String>, message: String) {
        self.invalid.insert(qualify(section, field.as_deref()));
        self.issues
            .push(ValidationIssue::new(section, field, IssueKind::InvalidType, message));
    }
}

fn qualify(section: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("{}.{}", section, field),
        None => section.to_string(),
    }
}

fn article(word: &str) -> &'static str {
    if word.starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    }
}

fn zero_score(schema: &SectionSchema) -> SectionScore {
    SectionScore {
        section: schema.name.clone(),
        score: 0.0,
        weight: schema.weight,
        completeness: 0.0,
        cardinality_factor: 0.0,
    }
}

fn absent_section(schema: &SectionSchema, findings: &mut Findings) {
    let per_field = schema.root == RootType::Object && schema.required_fields().next().is_some();
    if !per_field {
        findings.missing(&schema.name, None, "section is missing".to_string());
        return;
    }
    for field in schema.required_fields() {
        findings.missing(
            &schema.name,
            Some(field.path.to_string()),
            "section is missing".to_string(),
        );
    }
}

fn score_section(schema: &SectionSchema, value: &Value, findings: &mut Findings) -> SectionScore {
    let completeness = match schema.root {
        RootType::Object => check_fields(schema, value, findings),
        RootType::List => {
            let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
            check_entries(schema, items, findings)
        }
    };

    let mut factor = schema
        .cardinality
        .as_ref()
        .and_then(|rule| check_cardinality(schema, rule, value, findings))
        .unwrap_or(1.0);

    for rule in &schema.unique {
        factor *= check_uniqueness(schema, rule, value, findings);
    }

    SectionScore {
        section: schema.name.clone(),
        score: section_score(completeness, factor),
        weight: schema.weight,
        completeness,
        cardinality_factor: factor,
    }
}

/// Check declared fields of an object-rooted section.
fn check_fields(schema: &SectionSchema, value: &Value, findings: &mut Findings) -> f64 {
    let (satisfied, declared) = field_counts(&schema.name, &schema.fields, value, None, findings);
    completeness_ratio(satisfied, declared)
}

/// Count `(satisfied, declared)` required fields inside one mapping.
///
/// `prefix` locates the mapping within its section (an entry index for
/// list-rooted sections, `list.index` for entries of a nested list). Entry
/// fields of a present list count once per entry.
fn field_counts(
    section: &str,
    fields: &[FieldSpec],
    value: &Value,
    prefix: Option<&str>,
    findings: &mut Findings,
) -> (usize, usize) {
    let mut satisfied = 0;
    let mut declared = 0;

    for field in fields {
        let location = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field.path),
            None => field.path.to_string(),
        };
        if field.required {
            declared += 1;
        }

        match field.path.resolve(value) {
            None | Some(Value::Null) => {
                if field.required {
                    findings.missing(
                        section,
                        Some(location),
                        format!("required {} field is missing", field.field_type.name()),
                    );
                }
            }
            Some(found) if !field.field_type.matches(found) => {
                findings.invalid(
                    section,
                    Some(location),
                    format!(
                        "expected {}, found {}",
                        field.field_type.name(),
                        type_name(found)
                    ),
                );
            }
            Some(found) => {
                if field.required {
                    satisfied += 1;
                }
                if is_empty_value(found) {
                    findings.empty.insert(qualify(section, Some(&location)));
                }
                if let Some(items) = found.as_array().filter(|_| !field.entries.is_empty()) {
                    let (s, d) =
                        entry_counts(section, &field.entries, items, Some(&location), findings);
                    satisfied += s;
                    declared += d;
                }
            }
        }
    }

    (satisfied, declared)
}

/// Check declared fields on every entry of a list-rooted section.
fn check_entries(schema: &SectionSchema, items: &[Value], findings: &mut Findings) -> f64 {
    let (satisfied, declared) = entry_counts(&schema.name, &schema.fields, items, None, findings);
    completeness_ratio(satisfied, declared)
}

/// Count required fields across list entries. A non-object entry is an
/// invalid type and satisfies none of its fields.
fn entry_counts(
    section: &str,
    fields: &[FieldSpec],
    items: &[Value],
    prefix: Option<&str>,
    findings: &mut Findings,
) -> (usize, usize) {
    let mut satisfied = 0;
    let mut declared = 0;

    for (index, item) in items.iter().enumerate() {
        let location = match prefix {
            Some(prefix) => format!("{}.{}", prefix, index),
            None => index.to_string(),
        };
        if !item.is_object() {
            findings.invalid(
                section,
                Some(location),
                format!("entry must be an object, found {}", type_name(item)),
            );
            declared += fields.iter().filter(|f| f.required).count();
            continue;
        }
        let (s, d) = field_counts(section, fields, item, Some(&location), findings);
        satisfied += s;
        declared += d;
    }

    (satisfied, declared)
}

/// Evaluate the cardinality rule; `None` when the counted list is absent or
/// mistyped (already reported by the field checks).
fn check_cardinality(
    schema: &SectionSchema,
    rule: &CardinalityRule,
    value: &Value,
    findings: &mut Findings,
) -> Option<f64> {
    let mut violations = Vec::new();
    let mut factors = Vec::new();

    let total = match (schema.root, &rule.field) {
        (RootType::List, _) => value.as_array()?.len(),
        (RootType::Object, Some(field)) => list_at(value, field)?.len(),
        (RootType::Object, None) => {
            let mut total = 0;
            let mut counted_any = false;
            for partition in &rule.partitions {
                let Some(items) = list_at(value, &partition.field) else {
                    continue;
                };
                counted_any = true;
                total += items.len();

                let factor = cardinality_factor(items.len(), partition.min, partition.max);
                if factor < 1.0 {
                    violations.push(format!(
                        "'{}' expects {}-{} entries, found {}",
                        partition.field,
                        partition.min,
                        partition.max,
                        items.len()
                    ));
                }
                factors.push(factor);
            }
            if !counted_any {
                return None;
            }
            total
        }
    };

    let aggregate_factor = cardinality_factor(total, rule.min, rule.max);
    if aggregate_factor < 1.0 {
        violations.insert(
            0,
            format!("expected {}-{} entries, found {}", rule.min, rule.max, total),
        );
    }
    factors.insert(0, aggregate_factor);

    if !violations.is_empty() {
        findings.issues.push(ValidationIssue::new(
            &schema.name,
            rule.field.as_ref().map(FieldPath::to_string),
            IssueKind::CardinalityViolation,
            violations.join("; "),
        ));
    }

    Some(mean_factor(&factors))
}

fn list_at<'v>(value: &'v Value, path: &FieldPath) -> Option<&'v Vec<Value>> {
    path.resolve(value).and_then(Value::as_array)
}

/// A list entry together with its location inside the section.
struct Entry<'v> {
    location: String,
    value: &'v Value,
}

fn entries_of<'v>(items: &'v [Value], list: Option<&FieldPath>) -> impl Iterator<Item = Entry<'v>> + 'v {
    let prefix = list.map(|p| format!("{}.", p)).unwrap_or_default();
    items.iter().enumerate().map(move |(index, value)| Entry {
        location: format!("{}{}", prefix, index),
        value,
    })
}

/// Entries compared by a uniqueness rule.
fn unique_entries<'v>(
    schema: &SectionSchema,
    rule: &UniquenessRule,
    value: &'v Value,
) -> Option<Vec<Entry<'v>>> {
    if schema.root == RootType::List {
        return Some(entries_of(value.as_array()?, None).collect());
    }
    if let Some(list) = &rule.list {
        return Some(entries_of(list_at(value, list)?, Some(list)).collect());
    }

    let cardinality = schema.cardinality.as_ref()?;
    if let Some(field) = &cardinality.field {
        return Some(entries_of(list_at(value, field)?, Some(field)).collect());
    }

    let mut entries = Vec::new();
    for partition in &cardinality.partitions {
        if let Some(items) = list_at(value, &partition.field) {
            entries.extend(entries_of(items, Some(&partition.field)));
        }
    }
    Some(entries)
}

/// Record duplicates and return the section's duplicate factor for this rule.
fn check_uniqueness(
    schema: &SectionSchema,
    rule: &UniquenessRule,
    value: &Value,
    findings: &mut Findings,
) -> f64 {
    let Some(entries) = unique_entries(schema, rule, value) else {
        return 1.0;
    };

    let mut first_seen: BTreeMap<String, String> = BTreeMap::new();
    let mut duplicates = 0;

    for entry in &entries {
        let Some(key) = rule.field.resolve(entry.value).and_then(comparison_key) else {
            continue;
        };
        match first_seen.get(&key) {
            Some(first) => {
                duplicates += 1;
                findings.issues.push(ValidationIssue::new(
                    &schema.name,
                    Some(format!("{}.{}", entry.location, rule.field)),
                    IssueKind::DuplicateValue,
                    format!(
                        "'{}' duplicates {}.{} ({})",
                        rule.field, first, rule.field, key
                    ),
                ));
            }
            None => {
                first_seen.insert(key, entry.location.clone());
            }
        }
    }

    duplicate_factor(duplicates, entries.len())
}

/// Comparable form of a value; empty values never collide.
fn comparison_key(value: &Value) -> Option<String> {
    if is_empty_value(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}
