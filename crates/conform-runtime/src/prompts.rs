//! Prompts for LLM-backed correction.
//!
//! The system prompt is static so providers can cache it. Everything that
//! changes between rounds goes in the user message.

use std::fmt::Write as _;

use crate::correction::CorrectionRequest;

/// System prompt shared across all correction rounds.
pub const CORRECTION_SYSTEM_PROMPT: &str = r#"
You are a document correction service.

You receive a JSON document, the schema it must follow, and a list of
defects found by a deterministic validator. Your job is to fix the defects
in the sections you are asked to focus on.

## Correction Constraints
1. Rewrite ONLY the focus sections - other sections are ignored
2. Keep every correct value exactly as it is
3. Never invent figures: leave unknown numbers out rather than guessing
4. Respect list sizes: add or remove entries to fall inside the allowed range
5. Labels that must be unique must be genuinely distinct, not numbered copies

## Output Format
Return a single JSON object whose keys are the focus section names and
whose values are the corrected sections. Do not wrap it in prose.
"#;

/// Render the user message for one correction round.
pub fn render_correction_prompt(request: &CorrectionRequest) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Template: {} (round {}, score {:.3}, target {:.2})",
        request.template.name, request.attempt, request.score, request.threshold
    );
    let _ = writeln!(out, "Focus sections: {}", request.focus_sections.join(", "));

    out.push_str("\n## Section schemas\n");
    for name in &request.focus_sections {
        if let Some(schema) = request.template.section(name) {
            let rendered = serde_json::to_string_pretty(schema).unwrap_or_default();
            let _ = writeln!(out, "### {}\n{}", name, rendered);
        }
    }

    out.push_str("\n## Defects\n");
    let mut any = false;
    for issue in request.focus_issues() {
        let _ = writeln!(out, "- {}", issue);
        any = true;
    }
    if !any {
        out.push_str("- none recorded; improve completeness\n");
    }

    out.push_str("\n## Current sections\n");
    for name in &request.focus_sections {
        let current = request
            .document
            .section(name)
            .map(|value| serde_json::to_string_pretty(value).unwrap_or_default())
            .unwrap_or_else(|| "(missing)".to_string());
        let _ = writeln!(out, "### {}\n{}", name, current);
    }

    out
}
