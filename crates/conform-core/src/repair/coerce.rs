//! Structural type coercion.

use serde_json::{Map, Value};

use super::{segments, spec_for, value_at_mut, Repair, RepairAction};
use crate::document::type_name;
use crate::report::{IssueKind, ValidationIssue};
use crate::template::{FieldType, RootType, SectionSchema};

/// Resolves `InvalidType` issues by converting representation only.
///
/// Numbers and booleans become strings where strings are declared; a single
/// value becomes a one-element list where a list is declared. Nothing else
/// is attempted.
pub struct TypeCoercion;

impl TypeCoercion {
    fn coerce(expected: FieldType, value: &Value) -> Option<Value> {
        match (expected, value) {
            (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (FieldType::List, Value::Array(_) | Value::Null) => None,
            (FieldType::List, other) => Some(Value::Array(vec![other.clone()])),
            _ => None,
        }
    }
}

impl Repair for TypeCoercion {
    fn name(&self) -> &'static str {
        "type_coercion"
    }

    fn handles(&self) -> IssueKind {
        IssueKind::InvalidType
    }

    fn apply(
        &self,
        sections: &mut Map<String, Value>,
        schema: &SectionSchema,
        issue: &ValidationIssue,
    ) -> Option<RepairAction> {
        let section = sections.get_mut(&issue.section)?;

        let (target, expected) = match &issue.field {
            // Whole section has the wrong root type.
            None if schema.root == RootType::List => (section, FieldType::List),
            None => return None,
            Some(location) => {
                let spec = spec_for(schema, location)?;
                (value_at_mut(section, &segments(location))?, spec.field_type)
            }
        };

        let found = type_name(target);
        let coerced = Self::coerce(expected, target)?;
        *target = coerced;

        Some(RepairAction {
            description: format!("converted {} to {}", found, expected.name()),
            placeholder: false,
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
    fn test_coercions() {
        assert_eq!(
            TypeCoercion::coerce(FieldType::String, &json!(2024)),
            Some(json!("2024"))
        );
        assert_eq!(
            TypeCoercion::coerce(FieldType::String, &json!(true)),
            Some(json!("true"))
        );
        assert_eq!(
            TypeCoercion::coerce(FieldType::List, &json!("only")),
            Some(json!(["only"]))
        );
        assert_eq!(
            TypeCoercion::coerce(FieldType::List, &json!({ "k": 1 })),
            Some(json!([{ "k": 1 }]))
        );
        // Never invents values in the other direction.
        assert_eq!(TypeCoercion::coerce(FieldType::Number, &json!("12")), None);
        assert_eq!(TypeCoercion::coerce(FieldType::Object, &json!("x")), None);
    }

    #[test]
    fn test_list_section_root_is_wrapped() {
        let template = template();
        let doc = Document::from_value(json!({
            "overview": { "title": "Overview", "description": "d", "details": { "highlights": [] } },
            "buyers": { "buyer_name": "Apple" }
        }))
        .unwrap();

        let report = SchemaValidator::new(&template).validate(&doc);
        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);

        assert_eq!(
            outcome.document.section("buyers"),
            Some(&json!([{ "buyer_name": "Apple" }]))
        );
        assert_eq!(outcome.applied[0].repair, "type_coercion");
        assert!(!outcome.applied[0].placeholder);
    }

    #[test]
    fn test_wrong_object_root_left_alone() {
        let template = template();
        let doc = Document::from_value(json!({
            "overview": "Streaming company",
            "buyers": [{ "buyer_name": "Apple" }]
        }))
        .unwrap();

        let report = SchemaValidator::new(&template).validate(&doc);
        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);
        assert!(!outcome.changed());
        assert_eq!(outcome.unresolved.len(), 1);
    }

    #[test]
    fn test_nested_entry_field_coerced() {
        let template = crate::template::Template::from_yaml(
            r#"
name: team_deck
version: "1.0"
sections:
  - name: team
    weight: 1.0
    fields:
      - path: profiles
        type: list
        entries:
          - { path: name, type: string }
          - { path: experience_bullets, type: list }
"#,
        )
        .unwrap();
        let doc = Document::from_value(json!({
            "team": { "profiles": [{ "name": "Greg Peters", "experience_bullets": "COO since 2017" }] }
        }))
        .unwrap();

        let validator = SchemaValidator::new(&template);
        let report = validator.validate(&doc);
        assert_eq!(
            report.issues[0].field.as_deref(),
            Some("profiles.0.experience_bullets")
        );

        let outcome = LocalRepairFallback::new().apply(&doc, &template, &report.issues);
        assert_eq!(
            outcome.document.section("team").unwrap()["profiles"][0]["experience_bullets"],
            json!(["COO since 2017"])
        );
        assert_eq!(validator.validate(&outcome.document).overall_score, 1.0);
    }
}
