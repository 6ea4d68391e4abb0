//! # conform-core
//!
//! Deterministic template conformance engine.
//!
//! This crate answers one question about a structured document: how closely
//! does it match a reference template, and what exactly is wrong with it?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same document and template always produce the same report
//! 2. **Pure**: Validation never fails, never mutates, never performs I/O
//! 3. **Bounded**: Scores are always in `[0, 1]`; rule violations cap penalties
//!    instead of zeroing sections
//! 4. **Honest repairs**: Local repairs fix structure only and tag every
//!    placeholder as approximate
//!
//! ## Example
//!
//! ```rust,ignore
//! use conform_core::{Document, TemplateRegistry, BUILTIN_TEMPLATE, validate_named};
//!
//! let registry = TemplateRegistry::with_builtin()?;
//! let document = Document::from_json(&std::fs::read_to_string("deck.json")?)?;
//! let report = validate_named(&document, &registry, BUILTIN_TEMPLATE)?;
//!
//! println!("{}", report.render_text());
//! for path in &report.missing_fields {
//!     println!("missing: {}", path);
//! }
//! ```

pub mod document;
pub mod patterns;
pub mod repair;
pub mod report;
pub mod scoring;
pub mod template;
pub mod validator;

// Re-export main types at crate root
pub use document::{Document, DocumentError, FieldPath};
pub use repair::{AppliedRepair, LocalRepairFallback, Repair, RepairAction, RepairOutcome};
pub use report::{IssueKind, SectionScore, ValidationIssue, ValidationReport};
pub use template::{
    CardinalityRule, ConfigurationError, DirectoryTemplateSource, FieldSpec, FieldType,
    PartitionRule, RootType, SectionSchema, Template, TemplateRegistry, TemplateRegistryBuilder,
    TemplateSource, UniquenessRule, BUILTIN_TEMPLATE, RENDER_PLAN_TEMPLATE,
};
pub use validator::SchemaValidator;

/// Validate a document against a template.
///
/// This is the main entry point for one-shot scoring.
///
/// # Arguments
///
/// * `document` - The document to score
/// * `template` - The reference template
///
/// # Returns
///
/// A `ValidationReport` containing:
/// - `overall_score`: weighted aggregate in `[0, 1]`
/// - `section_scores`: per-section breakdown in template order
/// - `issues`: every defect found, in template order
/// - `missing_fields` / `invalid_types`: qualified paths
pub fn validate(document: &Document, template: &Template) -> ValidationReport {
    SchemaValidator::new(template).validate(document)
}

/// Validate a document against a template looked up by name.
///
/// Fails only when the template cannot be loaded.
pub fn validate_named(
    document: &Document,
    source: &dyn TemplateSource,
    template_name: &str,
) -> Result<ValidationReport, ConfigurationError> {
    let template = source.load(template_name)?;
    Ok(validate(document, &template))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    #[test]
    fn test_validate_named() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let document = Document::from_json(r#"{"business_overview": {"description": "x"}}"#).unwrap();

        let report = validate_named(&document, &registry, BUILTIN_TEMPLATE).unwrap();
        assert_eq!(report.template, BUILTIN_TEMPLATE);
        assert!(report.overall_score > 0.0 && report.overall_score < 0.1);
    }

    #[test]
    fn test_unknown_template_is_hard_failure() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let err = validate_named(&Document::new(), &registry, "missing").unwrap_err();
        assert!(matches!(err, ConfigurationError::TemplateNotFound(_)));
    }

    #[test]
    fn test_empty_document_scores_zero() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let report = validate_named(&Document::new(), &registry, BUILTIN_TEMPLATE).unwrap();
        assert_eq!(report.overall_score, 0.0);
        assert!(report
            .issues
            .iter()
            .all(|i| i.kind == IssueKind::MissingField));
    }

    #[test]
    fn test_render_plan_and_deck_use_their_own_template() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let plan = Document::from_json(
            r#"{"slides": [
                {"template": "business_overview", "data": {"title": "Business Overview"}},
                {"template": "management_team", "data": {}}
            ]}"#,
        )
        .unwrap();

        let report = validate_named(&plan, &registry, RENDER_PLAN_TEMPLATE).unwrap();
        assert_eq!(report.overall_score, 1.0);
        assert!(report.issues.is_empty());

        let report = validate_named(&plan, &registry, BUILTIN_TEMPLATE).unwrap();
        assert_eq!(report.overall_score, 0.0);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::UnknownSection && i.section == "slides"));
    }

    #[test]
    fn test_render_plan_slide_defects() {
        let registry = TemplateRegistry::with_builtin().unwrap();
        let plan = Document::from_json(
            r#"{"slides": [
                {"template": "business_overview", "data": {}},
                "management_team",
                {"template": "valuation_overview", "data": []}
            ]}"#,
        )
        .unwrap();

        let report = validate_named(&plan, &registry, RENDER_PLAN_TEMPLATE).unwrap();
        assert!(report.invalid_types.contains("slides.1"));
        assert!(report.invalid_types.contains("slides.2.data"));
        assert!((report.overall_score - 3.0 / 6.0).abs() < 1e-9);

        let empty = Document::from_json(r#"{"slides": []}"#).unwrap();
        let report = validate_named(&empty, &registry, RENDER_PLAN_TEMPLATE).unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::CardinalityViolation));
        assert!(report.overall_score < 1.0);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[A-Za-z ]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 5, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..5)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = Document> {
        let names = prop::sample::select(vec![
            "business_overview",
            "management_team",
            "valuation_overview",
            "precedent_transactions",
            "strategic_buyers",
            "appendix",
        ]);
        prop::collection::btree_map(names, arb_json(), 0..6).prop_map(|sections| {
            Document::from(
                sections
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect::<serde_json::Map<_, _>>(),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_validation_is_deterministic_and_bounded(doc in arb_document()) {
            let registry = TemplateRegistry::with_builtin().unwrap();
            let template = registry.load(BUILTIN_TEMPLATE).unwrap();

            let first = validate(&doc, &template);
            let second = validate(&doc, &template);
            prop_assert_eq!(&first, &second);
            prop_assert!((0.0..=1.0).contains(&first.overall_score));
            prop_assert!(first.section_scores.iter().all(|s| (0.0..=1.0).contains(&s.score)));
        }
    }
}
