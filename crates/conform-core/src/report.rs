//! Validation output types.
//!
//! A [`ValidationReport`] is an immutable value produced by one validation
//! run. Callers compare reports across refinement attempts instead of
//! reading shared state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;

/// Category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    InvalidType,
    CardinalityViolation,
    DuplicateValue,
    UnknownSection,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingField => "missing_field",
            IssueKind::InvalidType => "invalid_type",
            IssueKind::CardinalityViolation => "cardinality_violation",
            IssueKind::DuplicateValue => "duplicate_value",
            IssueKind::UnknownSection => "unknown_section",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single defect found in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub section: String,

    /// Path relative to the section. Entries of list-rooted sections are
    /// addressed by index: `2.target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub kind: IssueKind,
    pub message: String,

    /// Set when the field involved holds a placeholder inserted by local
    /// repair rather than genuine content.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approximate: bool,
}

impl ValidationIssue {
    pub fn new(section: &str, field: Option<String>, kind: IssueKind, message: String) -> Self {
        Self {
            section: section.to_string(),
            field,
            kind,
            message,
            approximate: false,
        }
    }

    /// Fully qualified location: `section` or `section.field`.
    pub fn path(&self) -> String {
        match &self.field {
            Some(field) => format!("{}.{}", self.section, field),
            None => self.section.clone(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path(), self.message)?;
        if self.approximate {
            f.write_str(" (approximate)")?;
        }
        Ok(())
    }
}

/// Score breakdown for one template section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: String,
    pub score: f64,
    pub weight: f64,
    pub completeness: f64,
    pub cardinality_factor: f64,
}

/// Result of validating one document against one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub template: String,
    pub template_version: String,

    /// Weighted aggregate in `[0, 1]`.
    pub overall_score: f64,

    /// Per-section scores in template order.
    pub section_scores: Vec<SectionScore>,

    /// Issues in template order, then unknown sections in document order.
    pub issues: Vec<ValidationIssue>,

    pub missing_fields: BTreeSet<String>,
    pub invalid_types: BTreeSet<String>,

    /// Present and correctly typed but empty. Informational only.
    #[serde(default)]
    pub empty_fields: BTreeSet<String>,

    /// Paths holding placeholders rather than genuine content.
    #[serde(default)]
    pub approximate: BTreeSet<String>,
}

impl ValidationReport {
    /// Whether the report reaches `threshold`.
    pub fn meets(&self, threshold: f64) -> bool {
        self.overall_score >= threshold
    }

    /// Score of a named section.
    pub fn section_score(&self, section: &str) -> Option<f64> {
        self.section_scores
            .iter()
            .find(|s| s.section == section)
            .map(|s| s.score)
    }

    /// Sections scoring below 1.0, worst first.
    ///
    /// Ties keep template order. `limit` caps the number returned.
    pub fn worst_sections(&self, limit: Option<usize>) -> Vec<String> {
        let mut imperfect: Vec<&SectionScore> =
            self.section_scores.iter().filter(|s| s.score < 1.0).collect();
        imperfect.sort_by(|a, b| a.score.total_cmp(&b.score));

        imperfect
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|s| s.section.clone())
            .collect()
    }

    /// Issues recorded against one section.
    pub fn issues_for<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues.iter().filter(move |i| i.section == section)
    }

    /// Number of issues per kind.
    pub fn issue_counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }

    /// A copy of this report with `paths` tagged as approximate.
    ///
    /// Issues located at or below a tagged path are marked too.
    pub fn with_approximate<I, S>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut report = self.clone();
        report.approximate.extend(paths.into_iter().map(Into::into));

        for issue in &mut report.issues {
            let path = issue.path();
            issue.approximate = report
                .approximate
                .iter()
                .any(|tagged| path == *tagged || path.starts_with(&format!("{}.", tagged)));
        }
        report
    }

    /// Issues that still reference placeholder content.
    pub fn approximate_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.approximate)
    }

    /// Actionable suggestions, one per issue kind and section.
    pub fn suggestions(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut suggestions = Vec::new();

        for issue in &self.issues {
            if !seen.insert((issue.section.as_str(), issue.kind)) {
                continue;
            }
            let fields: Vec<String> = self
                .issues_for(&issue.section)
                .filter(|i| i.kind == issue.kind)
                .filter_map(|i| i.field.clone())
                .collect();
            let listed = if fields.is_empty() {
                String::new()
            } else {
                format!(": {}", fields.join(", "))
            };

            let suggestion = match issue.kind {
                IssueKind::MissingField => {
                    format!("Add the missing fields to '{}'{}", issue.section, listed)
                }
                IssueKind::InvalidType => {
                    format!("Correct the value types in '{}'{}", issue.section, listed)
                }
                IssueKind::CardinalityViolation => format!(
                    "Adjust the number of entries in '{}' to the allowed range",
                    issue.section
                ),
                IssueKind::DuplicateValue => {
                    format!("Make the entries in '{}' distinct{}", issue.section, listed)
                }
                IssueKind::UnknownSection => format!(
                    "Remove or rename '{}'; the template does not define it",
                    issue.section
                ),
            };
            suggestions.push(suggestion);
        }

        suggestions
    }

    /// Readiness band for the overall score.
    pub fn band(&self) -> &'static str {
        match self.overall_score {
            s if s >= 0.95 => "READY",
            s if s >= 0.80 => "NEEDS REVIEW",
            _ => "INCOMPLETE",
        }
    }

    /// Plain-text summary for logs and terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Template: {} v{}", self.template, self.template_version);
        let _ = writeln!(
            out,
            "Overall score: {:.1}% ({})",
            self.overall_score * 100.0,
            self.band()
        );

        let _ = writeln!(out, "Sections:");
        for s in &self.section_scores {
            let marker = if s.score >= 1.0 { "ok" } else { "!!" };
            let _ = writeln!(
                out,
                "  [{}] {:<36} {:>5.1}%  (weight {:.2})",
                marker,
                s.section,
                s.score * 100.0,
                s.weight
            );
        }

        if self.issues.is_empty() {
            let _ = writeln!(out, "No issues.");
        } else {
            let _ = writeln!(out, "Issues ({}):", self.issues.len());
            for issue in &self.issues {
                let _ = writeln!(out, "  - {}", issue);
            }
        }

        if !self.empty_fields.is_empty() {
            let empty: Vec<&str> = self.empty_fields.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Empty fields: {}", empty.join(", "));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            let _ = writeln!(out, "Suggestions:");
            for suggestion in suggestions {
                let _ = writeln!(out, "  * {}", suggestion);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(section: &str, score: f64) -> SectionScore {
        SectionScore {
            section: section.to_string(),
            score,
            weight: 0.25,
            completeness: score,
            cardinality_factor: 1.0,
        }
    }

    fn report() -> ValidationReport {
        ValidationReport {
            template: "deck".to_string(),
            template_version: "1.0".to_string(),
            overall_score: 0.6,
            section_scores: vec![
                score("a", 1.0),
                score("b", 0.5),
                score("c", 0.2),
                score("d", 0.5),
            ],
            issues: vec![
                ValidationIssue::new(
                    "b",
                    Some("items".to_string()),
                    IssueKind::CardinalityViolation,
                    "too few".to_string(),
                ),
                ValidationIssue::new(
                    "c",
                    Some("title".to_string()),
                    IssueKind::MissingField,
                    "missing".to_string(),
                ),
                ValidationIssue::new(
                    "c",
                    Some("notes".to_string()),
                    IssueKind::MissingField,
                    "missing".to_string(),
                ),
            ],
            missing_fields: ["c.title".to_string(), "c.notes".to_string()].into(),
            invalid_types: BTreeSet::new(),
            empty_fields: BTreeSet::new(),
            approximate: BTreeSet::new(),
        }
    }

    #[test]
    fn test_worst_sections_ordering() {
        let r = report();
        assert_eq!(r.worst_sections(None), vec!["c", "b", "d"]);
        assert_eq!(r.worst_sections(Some(2)), vec!["c", "b"]);
    }

    #[test]
    fn test_with_approximate_tags_matching_issues() {
        let original = report();
        let tagged = original.with_approximate(["b.items"]);

        assert!(tagged.issues[0].approximate);
        assert!(!tagged.issues[1].approximate);
        assert!(tagged.approximate.contains("b.items"));
        // The source report is untouched.
        assert!(original.approximate.is_empty());
        assert!(!original.issues[0].approximate);
    }

    #[test]
    fn test_suggestions_one_per_kind_and_section() {
        let suggestions = report().suggestions();
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[1].contains("title, notes"));
    }

    #[test]
    fn test_render_text_mentions_everything() {
        let text = report().render_text();
        assert!(text.contains("Overall score: 60.0% (INCOMPLETE)"));
        assert!(text.contains("Issues (3):"));
        assert!(text.contains("[missing_field] c.title: missing"));
        assert!(text.contains("Suggestions:"));
    }

    #[test]
    fn test_issue_counts() {
        let counts = report().issue_counts();
        assert_eq!(counts[&IssueKind::MissingField], 2);
        assert_eq!(counts[&IssueKind::CardinalityViolation], 1);
    }
}
