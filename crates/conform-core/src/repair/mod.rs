//! Deterministic local repairs.
//!
//! When no correction service is reachable, [`LocalRepairFallback`] resolves
//! the structural defects it can without inventing content:
//!
//! - **Type coercion**: numbers and booleans where strings are declared become
//!   strings; single values where lists are declared are wrapped.
//! - **Placeholders**: missing fields with a template default receive that
//!   default and are tagged approximate.
//! - **Label disambiguation**: duplicate labels get a positional suffix.
//!
//! Anything else (cardinality, unknown sections, missing content without a
//! default) is returned unresolved.

mod coerce;
mod label;
mod placeholder;

pub use coerce::TypeCoercion;
pub use label::LabelDisambiguation;
pub use placeholder::PlaceholderInsertion;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::document::Document;
use crate::report::{IssueKind, ValidationIssue};
use crate::template::{FieldSpec, RootType, SectionSchema, Template};

/// A single rule-based fixer for one kind of issue.
pub trait Repair: Send + Sync {
    /// Stable identifier used in audit records.
    fn name(&self) -> &'static str;

    /// The issue kind this repair resolves.
    fn handles(&self) -> IssueKind;

    /// Try to resolve `issue` in the working copy of the document.
    ///
    /// Returns `None` and leaves `sections` untouched when the issue is out
    /// of reach for this repair.
    fn apply(
        &self,
        sections: &mut Map<String, Value>,
        schema: &SectionSchema,
        issue: &ValidationIssue,
    ) -> Option<RepairAction>;
}

/// What a repair did.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairAction {
    pub description: String,

    /// The value written is filler rather than genuine content.
    pub placeholder: bool,
}

/// Audit record for one applied repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRepair {
    pub repair: String,
    pub path: String,
    pub kind: IssueKind,
    pub description: String,
    pub placeholder: bool,
}

/// Result of running the fallback over a set of issues.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// The repaired copy; equal to the input when nothing applied.
    pub document: Document,
    pub applied: Vec<AppliedRepair>,

    /// Qualified paths now holding placeholders.
    pub approximate: BTreeSet<String>,

    pub unresolved: Vec<ValidationIssue>,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Ordered table of repairs.
pub struct LocalRepairFallback {
    repairs: Vec<Box<dyn Repair>>,
}

impl LocalRepairFallback {
    /// The standard table: coercion, then placeholders, then labels.
    ///
    /// Coercion runs first so a wrapped list can still receive entries, and
    /// labels run last because placeholders never introduce duplicates.
    pub fn new() -> Self {
        Self {
            repairs: vec![
                Box::new(TypeCoercion),
                Box::new(PlaceholderInsertion),
                Box::new(LabelDisambiguation),
            ],
        }
    }

    /// A fallback with a custom repair table.
    pub fn with_repairs(repairs: Vec<Box<dyn Repair>>) -> Self {
        Self { repairs }
    }

    /// Apply the repair table to `issues` found in `document`.
    ///
    /// The input document is never modified; the outcome carries a new one.
    pub fn apply(
        &self,
        document: &Document,
        template: &Template,
        issues: &[ValidationIssue],
    ) -> RepairOutcome {
        let mut sections = document.as_map().clone();
        let mut applied = Vec::new();
        let mut approximate = BTreeSet::new();
        let mut resolved = vec![false; issues.len()];

        for repair in &self.repairs {
            for (index, issue) in issues.iter().enumerate() {
                if resolved[index] || issue.kind != repair.handles() {
                    continue;
                }
                let Some(schema) = template.section(&issue.section) else {
                    continue;
                };
                let Some(action) = repair.apply(&mut sections, schema, issue) else {
                    continue;
                };

                let path = issue.path();
                tracing::debug!(
                    repair = repair.name(),
                    path = %path,
                    placeholder = action.placeholder,
                    "local repair applied"
                );
                if action.placeholder {
                    approximate.insert(path.clone());
                }
                applied.push(AppliedRepair {
                    repair: repair.name().to_string(),
                    path,
                    kind: issue.kind,
                    description: action.description,
                    placeholder: action.placeholder,
                });
                resolved[index] = true;
            }
        }

        let unresolved = issues
            .iter()
            .zip(&resolved)
            .filter(|(_, done)| !**done)
            .map(|(issue, _)| issue.clone())
            .collect();

        RepairOutcome {
            document: Document::from(sections),
            applied,
            approximate,
            unresolved,
        }
    }
}

impl Default for LocalRepairFallback {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an issue location into path segments.
fn segments(location: &str) -> Vec<&str> {
    location.split('.').collect()
}

/// Field spec for an issue location; list-rooted sections prefix the entry
/// index.
fn spec_for<'s>(schema: &'s SectionSchema, location: &str) -> Option<&'s FieldSpec> {
    match schema.root {
        RootType::Object => FieldSpec::find(&schema.fields, location),
        RootType::List => {
            let (index, rest) = location.split_once('.')?;
            index.parse::<usize>().ok()?;
            FieldSpec::find(&schema.fields, rest)
        }
    }
}

/// Walk mappings by key and lists by index.
fn value_at_mut<'v>(root: &'v mut Value, segments: &[&str]) -> Option<&'v mut Value> {
    segments.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get_mut(*segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |index| items.get_mut(index)),
        _ => None,
    })
}

/// Set the value at `segments`, creating intermediate mappings.
///
/// List indices must already exist; `null` intermediates are replaced.
fn insert_at(root: &mut Value, segments: &[&str], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => {
                let slot = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if slot.is_null() {
                    *slot = Value::Object(Map::new());
                }
                slot
            }
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(item) => item,
                None => return false,
            },
            _ => return false,
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::SchemaValidator;
    use serde_json::json;

    pub(super) fn template() -> Template {
        Template::from_yaml(
            r#"
name: small_deck
version: "1.0"
sections:
  - name: overview
    weight: 0.5
    fields:
      - { path: title, type: string, default: "Overview" }
      - { path: description, type: string }
      - { path: details.highlights, type: list, default: [] }
  - name: buyers
    type: list
    weight: 0.5
    fields:
      - { path: buyer_name, type: string }
      - { path: founded, type: string, required: false }
    cardinality: { min: 1, max: 4 }
    unique:
      - field: buyer_name
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fallback_never_mutates_input() {
        let template = template();
        let doc = Document::from_value(json!({
            "overview": { "description": "Streaming" },
            "buyers": [{ "buyer_name": "Apple" }, { "buyer_name": "Apple" }]
        }))
        .unwrap();
        let before = doc.clone();

        let report = SchemaValidator::new(&template).validate(&doc);
        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);

        assert_eq!(doc, before);
        assert!(outcome.changed());
        assert_ne!(outcome.document, doc);
    }

    #[test]
    fn test_repaired_document_validates_clean() {
        let template = template();
        let doc = Document::from_value(json!({
            "overview": { "description": "Streaming", "details": null },
            "buyers": [{ "buyer_name": "Apple", "founded": 1976 }, { "buyer_name": "Apple" }]
        }))
        .unwrap();

        let validator = SchemaValidator::new(&template);
        let report = validator.validate(&doc);
        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);

        assert!(outcome.unresolved.is_empty(), "{:?}", outcome.unresolved);
        let repaired = validator.validate(&outcome.document);
        assert_eq!(repaired.overall_score, 1.0);
        assert_eq!(
            outcome.approximate,
            BTreeSet::from([
                "overview.title".to_string(),
                "overview.details.highlights".to_string()
            ])
        );
        assert_eq!(
            outcome.document.section("buyers").unwrap()[1]["buyer_name"],
            json!("Apple (2)")
        );
        assert_eq!(
            outcome.document.section("buyers").unwrap()[0]["founded"],
            json!("1976")
        );
    }

    #[test]
    fn test_content_without_default_stays_unresolved() {
        let template = template();
        let doc = Document::from_value(json!({
            "overview": { "title": "Overview", "details": { "highlights": [] } },
            "buyers": []
        }))
        .unwrap();

        let report = SchemaValidator::new(&template).validate(&doc);
        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);

        assert!(!outcome.changed());
        assert_eq!(outcome.document, doc);
        let kinds: Vec<IssueKind> = outcome.unresolved.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![IssueKind::MissingField, IssueKind::CardinalityViolation]
        );
    }

    #[test]
    fn test_insert_at_creates_parents() {
        let mut value = json!({ "a": null });
        assert!(insert_at(&mut value, &["a", "b", "c"], json!([])));
        assert_eq!(value, json!({ "a": { "b": { "c": [] } } }));

        let mut list = json!([{ "x": 1 }]);
        assert!(insert_at(&mut list, &["0", "y"], json!("v")));
        assert!(!insert_at(&mut list, &["3", "y"], json!("v")));
    }
}
