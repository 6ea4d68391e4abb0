//! Placeholder insertion for missing fields.

use serde_json::{Map, Value};

use super::{insert_at, segments, spec_for, Repair, RepairAction};
use crate::report::{IssueKind, ValidationIssue};
use crate::template::{RootType, SectionSchema};

/// Resolves `MissingField` issues whose field declares a default.
///
/// The inserted value is always reported as a placeholder so callers can
/// tell filler from genuine content. A missing object-rooted section is
/// created as an empty mapping first.
pub struct PlaceholderInsertion;

impl Repair for PlaceholderInsertion {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn handles(&self) -> IssueKind {
        IssueKind::MissingField
    }

    fn apply(
        &self,
        sections: &mut Map<String, Value>,
        schema: &SectionSchema,
        issue: &ValidationIssue,
    ) -> Option<RepairAction> {
        let location = issue.field.as_deref()?;
        let default = spec_for(schema, location)?.default.clone()?;

        let mut section = match sections.get(&issue.section) {
            Some(existing) => existing.clone(),
            None if schema.root == RootType::Object => Value::Object(Map::new()),
            None => return None,
        };
        if !insert_at(&mut section, &segments(location), default) {
            return None;
        }
        sections.insert(issue.section.clone(), section);

        Some(RepairAction {
            description: format!("inserted template default for '{}'", location),
            placeholder: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::repair::tests::template;
    use crate::repair::LocalRepairFallback;
    use crate::validator::SchemaValidator;
    use serde_json::json;

    #[test]
    fn test_missing_section_gets_defaults_only() {
        let template = template();
        let doc = Document::from_value(json!({
            "buyers": [{ "buyer_name": "Apple" }]
        }))
        .unwrap();

        let report = SchemaValidator::new(&template).validate(&doc);
        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);

        assert_eq!(
            outcome.document.section("overview"),
            Some(&json!({ "title": "Overview", "details": { "highlights": [] } }))
        );
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(outcome.unresolved[0].field.as_deref(), Some("description"));
        assert!(outcome.applied.iter().all(|a| a.placeholder));
    }

    #[test]
    fn test_placeholders_flagged_in_revalidated_report() {
        let template = template();
        let doc = Document::from_value(json!({
            "overview": { "description": "Streaming" },
            "buyers": [{ "buyer_name": "Apple" }]
        }))
        .unwrap();

        let validator = SchemaValidator::new(&template);
        let outcome =
            LocalRepairFallback::new().apply(&doc, &template, &validator.validate(&doc).issues);
        let report = validator
            .validate(&outcome.document)
            .with_approximate(outcome.approximate.iter().cloned());

        assert!(report.approximate.contains("overview.title"));
        assert_eq!(report.overall_score, 1.0);
    }

    #[test]
    fn test_failed_insert_leaves_sections_untouched() {
        let template = template();
        let schema = template.section("overview").unwrap();
        let mut sections = Document::from_value(json!({ "overview": "Streaming" }))
            .unwrap()
            .as_map()
            .clone();
        let before = sections.clone();

        let issue = ValidationIssue::new(
            "overview",
            Some("title".to_string()),
            IssueKind::MissingField,
            "missing".to_string(),
        );
        assert!(PlaceholderInsertion.apply(&mut sections, schema, &issue).is_none());
        assert_eq!(sections, before);

        let mut sections = Map::new();
        assert!(PlaceholderInsertion.apply(&mut sections, schema, &issue).is_some());
        assert_eq!(sections.get("overview"), Some(&json!({ "title": "Overview" })));
    }
}
