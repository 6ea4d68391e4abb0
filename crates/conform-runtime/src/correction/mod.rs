//! Correction service abstraction.
//!
//! A correction service receives a document, its defects and the sections
//! to focus on, and returns a proposed corrected document. Services are
//! remote and fallible; the orchestrator owns retries, timeouts and
//! fallback, so implementations make exactly one attempt per call.

use async_trait::async_trait;
use conform_core::{Document, Template, ValidationIssue};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod llm;

pub use llm::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmCorrectionService, LlmProvider,
    ProviderError, TokenUsage,
};

/// Errors from correction services.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectionError {
    #[error("Correction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed correction response: {0}")]
    Malformed(String),

    #[error("Correction request rejected: {0}")]
    Rejected(String),

    #[error("Correction service unavailable: {0}")]
    Unavailable(String),

    #[error("Correction cancelled")]
    Cancelled,
}

impl CorrectionError {
    /// Whether another call in the same round may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CorrectionError::Timeout(_)
                | CorrectionError::Network(_)
                | CorrectionError::RateLimited { .. }
                | CorrectionError::Malformed(_)
        )
    }
}

/// What a correction service is asked to fix.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionRequest {
    /// The current document
    pub document: Document,

    /// Every issue from the latest validation
    pub issues: Vec<ValidationIssue>,

    /// Sections the service should rewrite, worst first
    pub focus_sections: Vec<String>,

    /// Template the document must conform to
    #[serde(skip)]
    pub template: Arc<Template>,

    /// 1-based correction round
    pub attempt: usize,

    /// Score before this round
    pub score: f64,

    /// Score the run is aiming for
    pub threshold: f64,
}

impl CorrectionRequest {
    /// Issues that fall inside the focus sections.
    pub fn focus_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| self.focus_sections.contains(&issue.section))
    }
}

/// A proposed corrected document.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionResponse {
    pub corrected_document: Document,
}

impl CorrectionResponse {
    pub fn new(corrected_document: Document) -> Self {
        Self { corrected_document }
    }

    /// Reject responses the merge step cannot use.
    ///
    /// A response must carry at least one focus section and must not null
    /// out any of them.
    pub fn check_well_formed(&self, request: &CorrectionRequest) -> Result<(), CorrectionError> {
        let document = &self.corrected_document;

        for name in &request.focus_sections {
            if matches!(document.section(name), Some(serde_json::Value::Null)) {
                return Err(CorrectionError::Malformed(format!(
                    "section '{}' was returned as null",
                    name
                )));
            }
        }

        if !request.focus_sections.is_empty()
            && !request
                .focus_sections
                .iter()
                .any(|name| document.contains_section(name))
        {
            return Err(CorrectionError::Malformed(
                "response contains none of the requested sections".to_string(),
            ));
        }

        Ok(())
    }
}

/// A remote service that proposes document corrections.
#[async_trait]
pub trait CorrectionService: Send + Sync {
    /// Service name, used to key its circuit and in logs.
    fn name(&self) -> &str;

    /// Make one correction attempt.
    async fn correct(&self, request: &CorrectionRequest)
        -> Result<CorrectionResponse, CorrectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use conform_core::{TemplateRegistry, BUILTIN_TEMPLATE};
    use serde_json::json;

    fn request(focus: &[&str]) -> CorrectionRequest {
        let template = TemplateRegistry::with_builtin()
            .unwrap()
            .get(BUILTIN_TEMPLATE)
            .unwrap();
        CorrectionRequest {
            document: Document::new(),
            issues: Vec::new(),
            focus_sections: focus.iter().map(|s| s.to_string()).collect(),
            template,
            attempt: 1,
            score: 0.0,
            threshold: 0.95,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(CorrectionError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(CorrectionError::Network("reset".into()).is_transient());
        assert!(CorrectionError::RateLimited { retry_after: None }.is_transient());
        assert!(CorrectionError::Malformed("bad".into()).is_transient());
        assert!(!CorrectionError::Rejected("no".into()).is_transient());
        assert!(!CorrectionError::Unavailable("down".into()).is_transient());
        assert!(!CorrectionError::Cancelled.is_transient());
    }

    #[test]
    fn test_well_formed_response() {
        let response = CorrectionResponse::new(
            Document::from_value(json!({ "management_team": { "title": "Team" } })).unwrap(),
        );
        assert!(response
            .check_well_formed(&request(&["management_team", "valuation_overview"]))
            .is_ok());
    }

    #[test]
    fn test_null_focus_section_rejected() {
        let response = CorrectionResponse::new(
            Document::from_value(json!({ "management_team": null })).unwrap(),
        );
        let err = response
            .check_well_formed(&request(&["management_team"]))
            .unwrap_err();
        assert!(matches!(err, CorrectionError::Malformed(_)));
    }

    #[test]
    fn test_response_without_focus_sections_rejected() {
        let response = CorrectionResponse::new(
            Document::from_value(json!({ "business_overview": {} })).unwrap(),
        );
        assert!(response
            .check_well_formed(&request(&["management_team"]))
            .is_err());
    }
}
