//! JSON Schema validation for template files.
//!
//! Every template must validate against `schemas/template.schema.json`
//! before it is deserialized. The schema is embedded at compile time and
//! compiled once.

use std::sync::OnceLock;

/// Embedded template schema (loaded at compile time).
const TEMPLATE_SCHEMA_JSON: &str = include_str!("../../../../schemas/template.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(TEMPLATE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a template JSON value against the schema.
///
/// # Returns
///
/// * `Ok(())` - Template is structurally valid
/// * `Err(Vec<String>)` - One message per violation, with its instance path
pub fn validate_template_schema(template_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(template_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "name": "one_pager",
            "version": "1.0",
            "sections": [
                { "name": "summary", "weight": 1.0, "fields": [
                    { "path": "headline", "type": "string" }
                ]}
            ]
        })
    }

    #[test]
    fn test_minimal_template_passes() {
        assert!(validate_template_schema(&minimal()).is_ok());
    }

    #[test]
    fn test_missing_sections_fails() {
        let value = json!({ "name": "one_pager", "version": "1.0" });
        assert!(validate_template_schema(&value).is_err());
    }

    #[test]
    fn test_bad_field_path_reports_location() {
        let mut value = minimal();
        value["sections"][0]["fields"][0]["path"] = json!("head line");
        let errors = validate_template_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("/sections/0/fields/0/path")));
    }

    #[test]
    fn test_numeric_default_rejected() {
        let mut value = minimal();
        value["sections"][0]["fields"][0]["default"] = json!(42);
        assert!(validate_template_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_property_fails() {
        let mut value = minimal();
        value["owner"] = json!("someone");
        assert!(validate_template_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_field_type_fails() {
        let mut value = minimal();
        value["sections"][0]["fields"][0]["type"] = json!("date");
        assert!(validate_template_schema(&value).is_err());
    }
}
