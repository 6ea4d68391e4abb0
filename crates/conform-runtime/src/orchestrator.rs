//! Refinement orchestrator.
//!
//! Drives one document through repeated validate-and-correct rounds until it
//! reaches the threshold, runs out of attempts, or is cancelled:
//!
//! ```text
//! Idle -> Validating -> Validated
//!            |  ^
//!            v  |
//!     AwaitingCorrection -> (Exhausted | Cancelled)
//! ```
//!
//! Each round asks the correction service to rewrite the worst sections,
//! with retries and a per-call timeout. When the service cannot help, the
//! round falls back to local structural repair. Sections the round did not
//! flag are never touched.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use backon::Retryable;
use conform_core::{
    AppliedRepair, ConfigurationError, Document, LocalRepairFallback, Template, TemplateSource,
    ValidationIssue, ValidationReport,
};

use crate::cache::ValidationCache;
use crate::config::{ConfigError, RuntimeConfig};
use crate::correction::{CorrectionError, CorrectionRequest, CorrectionResponse, CorrectionService};
use crate::merge::merge_flagged;
use crate::resilience::{CircuitBreaker, CorrectionUsage};

/// Lifecycle of a single refinement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementState {
    Idle,

    /// The latest report decides the next state
    Validating,

    /// A correction round is in flight
    AwaitingCorrection,

    Validated,
    Exhausted,
    Cancelled,
}

impl RefinementState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefinementState::Validated | RefinementState::Exhausted | RefinementState::Cancelled
        )
    }
}

/// How a refinement run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    Validated,
    Exhausted,
    Cancelled,

    /// The template could not be loaded; no rounds ran
    ConfigurationError,
}

/// What a single correction round achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Score strictly increased
    Improved,
    Unchanged,

    /// The service failed, was skipped, or the round was cancelled
    Failed,
}

/// Audit record for one correction round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementAttempt {
    /// 1-based round number
    pub index: usize,

    pub report_before: ValidationReport,

    /// Every issue sent with the request
    pub issues_sent: Vec<ValidationIssue>,

    /// Sections the round was allowed to change, worst first
    pub focus_sections: Vec<String>,

    pub document_after: Document,
    pub report_after: ValidationReport,
    pub outcome: AttemptOutcome,

    /// Calls to the correction service, retries included
    pub service_calls: u32,

    pub used_fallback: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<AppliedRepair>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Final state of a refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementResult {
    pub final_document: Document,
    pub final_report: ValidationReport,
    pub attempts: Vec<RefinementAttempt>,
    pub status: RefinementStatus,
    pub usage: CorrectionUsage,

    /// Set when the run could not start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefinementResult {
    /// A result for a run whose template could not be loaded.
    pub fn configuration_error(
        document: Document,
        template_name: &str,
        error: &ConfigurationError,
    ) -> Self {
        Self {
            final_document: document,
            final_report: ValidationReport {
                template: template_name.to_string(),
                template_version: String::new(),
                overall_score: 0.0,
                section_scores: Vec::new(),
                issues: Vec::new(),
                missing_fields: BTreeSet::new(),
                invalid_types: BTreeSet::new(),
                empty_fields: BTreeSet::new(),
                approximate: BTreeSet::new(),
            },
            attempts: Vec::new(),
            status: RefinementStatus::ConfigurationError,
            usage: CorrectionUsage::default(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_validated(&self) -> bool {
        self.status == RefinementStatus::Validated
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RefineOptions {
    pub threshold: f64,
    pub max_attempts: usize,
    pub cancellation: Option<CancellationToken>,
}

impl RefineOptions {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            threshold: config.threshold,
            max_attempts: config.max_attempts,
            cancellation: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// Working state of one run.
struct Run {
    template: Arc<Template>,
    document: Document,
    report: ValidationReport,
    approximate: BTreeSet<String>,
    attempts: Vec<RefinementAttempt>,
    usage: CorrectionUsage,
}

#[derive(Debug, Default)]
struct CallStats {
    calls: u32,
    timeouts: u32,
}

/// Drives documents toward the conformance threshold.
pub struct RefinementOrchestrator {
    templates: Arc<dyn TemplateSource>,
    service: Option<Arc<dyn CorrectionService>>,
    fallback: LocalRepairFallback,
    circuit_breaker: CircuitBreaker,
    cache: Option<ValidationCache>,
    config: RuntimeConfig,
}

impl std::fmt::Debug for RefinementOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RefinementOrchestrator {
    pub fn builder() -> RefinementOrchestratorBuilder {
        RefinementOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Options taken from the runtime config.
    pub fn default_options(&self) -> RefineOptions {
        RefineOptions::from_config(&self.config)
    }

    /// Validate a document without correcting it.
    pub async fn validate(
        &self,
        document: &Document,
        template_name: &str,
    ) -> Result<ValidationReport, ConfigurationError> {
        let template = self.templates.load(template_name)?;
        Ok(self.validate_tagged(&template, document, &BTreeSet::new()).await)
    }

    /// Refine one document.
    ///
    /// Fails only when the template cannot be loaded. Every other problem,
    /// including an unreachable correction service, ends in a result.
    #[tracing::instrument(skip_all, fields(template = %template_name))]
    pub async fn refine(
        &self,
        document: &Document,
        template_name: &str,
        options: RefineOptions,
    ) -> Result<RefinementResult, ConfigurationError> {
        let template = self.templates.load(template_name)?;
        let token = options
            .cancellation
            .clone()
            .unwrap_or_else(CancellationToken::new);

        let approximate = BTreeSet::new();
        let report = self.validate_tagged(&template, document, &approximate).await;
        let mut run = Run {
            template,
            document: document.clone(),
            report,
            approximate,
            attempts: Vec::new(),
            usage: CorrectionUsage::default(),
        };

        let mut state = RefinementState::Idle;
        while !state.is_terminal() {
            state = match state {
                RefinementState::Idle => RefinementState::Validating,
                RefinementState::Validating => {
                    if run.report.meets(options.threshold) {
                        RefinementState::Validated
                    } else if token.is_cancelled() {
                        RefinementState::Cancelled
                    } else if run.attempts.len() >= options.max_attempts {
                        RefinementState::Exhausted
                    } else {
                        RefinementState::AwaitingCorrection
                    }
                }
                RefinementState::AwaitingCorrection => {
                    if self.correction_round(&mut run, &options, &token).await {
                        RefinementState::Validating
                    } else {
                        RefinementState::Cancelled
                    }
                }
                terminal => terminal,
            };
            tracing::trace!(state = ?state, "Refinement state");
        }

        let status = match state {
            RefinementState::Validated => RefinementStatus::Validated,
            RefinementState::Cancelled => RefinementStatus::Cancelled,
            _ => RefinementStatus::Exhausted,
        };

        tracing::info!(
            status = ?status,
            attempts = run.attempts.len(),
            score = run.report.overall_score,
            "Refinement finished"
        );

        Ok(RefinementResult {
            final_document: run.document,
            final_report: run.report,
            attempts: run.attempts,
            status,
            usage: run.usage,
            error: None,
        })
    }

    /// Refine a batch of independent documents concurrently.
    ///
    /// Results come back in input order. A document whose template cannot
    /// be loaded gets a `ConfigurationError` result instead of failing the
    /// batch.
    pub async fn refine_all<I>(&self, jobs: I, options: &RefineOptions) -> Vec<RefinementResult>
    where
        I: IntoIterator<Item = (Document, String)>,
    {
        let runs = jobs.into_iter().map(|(document, template_name)| {
            let options = options.clone();
            async move {
                match self.refine(&document, &template_name, options).await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(template = %template_name, error = %err, "Refinement could not start");
                        RefinementResult::configuration_error(document, &template_name, &err)
                    }
                }
            }
        });

        join_all(runs).await
    }

    /// Run one correction round. Returns false if the round was cancelled.
    async fn correction_round(
        &self,
        run: &mut Run,
        options: &RefineOptions,
        token: &CancellationToken,
    ) -> bool {
        let started_at = Utc::now();
        let report_before = run.report.clone();
        let focus = report_before.worst_sections(self.config.focus_limit);
        let request = CorrectionRequest {
            document: run.document.clone(),
            issues: report_before.issues.clone(),
            focus_sections: focus.clone(),
            template: run.template.clone(),
            attempt: run.attempts.len() + 1,
            score: report_before.overall_score,
            threshold: options.threshold,
        };
        run.usage.rounds += 1;

        let mut service_calls = 0;
        let corrected = match &self.service {
            None => Err(CorrectionError::Unavailable(
                "no correction service configured".to_string(),
            )),
            Some(service) if self.circuit_breaker.is_open(service.name()) => {
                run.usage.circuit_skips += 1;
                tracing::warn!(service = service.name(), "Circuit open, falling back to local repair");
                Err(CorrectionError::Unavailable("circuit open".to_string()))
            }
            Some(service) => {
                let (result, stats) = self.call_service(service.as_ref(), &request, token).await;
                service_calls = stats.calls;
                run.usage.service_calls += stats.calls;
                run.usage.retries += stats.calls.saturating_sub(1);
                run.usage.timeouts += stats.timeouts;

                match &result {
                    Ok(_) => self.circuit_breaker.record_success(service.name()),
                    Err(CorrectionError::Cancelled) => {}
                    Err(_) => self.circuit_breaker.record_failure(service.name()),
                }
                result
            }
        };

        let mut used_fallback = false;
        let mut repairs = Vec::new();
        let mut failed = false;
        let mut cancelled = false;

        let document_after = match corrected {
            Ok(response) => {
                let merged = merge_flagged(&run.document, &response.corrected_document, &focus);
                for section in &merged.replaced {
                    let prefix = format!("{}.", section);
                    run.approximate
                        .retain(|path| path != section && !path.starts_with(&prefix));
                }
                merged.document
            }
            Err(CorrectionError::Cancelled) => {
                cancelled = true;
                failed = true;
                run.document.clone()
            }
            Err(err) => {
                tracing::warn!(error = %err, "Correction failed, applying local repair");
                failed = true;
                used_fallback = true;
                run.usage.fallbacks += 1;

                let issues: Vec<_> = report_before
                    .issues
                    .iter()
                    .filter(|issue| focus.contains(&issue.section))
                    .cloned()
                    .collect();
                let repaired = self.fallback.apply(&run.document, &run.template, &issues);
                run.approximate.extend(repaired.approximate.iter().cloned());
                repairs = repaired.applied;
                repaired.document
            }
        };

        let report_after = if cancelled {
            report_before.clone()
        } else {
            self.validate_tagged(&run.template, &document_after, &run.approximate)
                .await
        };

        let outcome = if failed {
            AttemptOutcome::Failed
        } else if report_after.overall_score > report_before.overall_score {
            AttemptOutcome::Improved
        } else {
            AttemptOutcome::Unchanged
        };

        tracing::debug!(
            attempt = request.attempt,
            before = report_before.overall_score,
            after = report_after.overall_score,
            outcome = ?outcome,
            "Correction round complete"
        );

        run.attempts.push(RefinementAttempt {
            index: request.attempt,
            issues_sent: request.issues.clone(),
            report_before,
            focus_sections: focus,
            document_after: document_after.clone(),
            report_after: report_after.clone(),
            outcome,
            service_calls,
            used_fallback,
            repairs,
            started_at,
            finished_at: Utc::now(),
        });
        run.document = document_after;
        run.report = report_after;

        !cancelled
    }

    /// Call the service with retries on transient failures.
    ///
    /// Each call is bounded by the request timeout; cancellation aborts the
    /// call or the backoff sleep immediately.
    async fn call_service(
        &self,
        service: &dyn CorrectionService,
        request: &CorrectionRequest,
        token: &CancellationToken,
    ) -> (Result<CorrectionResponse, CorrectionError>, CallStats) {
        let calls = AtomicU32::new(0);
        let timeouts = AtomicU32::new(0);
        let timeout = self.config.request_timeout;

        let (calls_ref, timeouts_ref) = (&calls, &timeouts);
        let attempt = move || async move {
            calls_ref.fetch_add(1, Ordering::Relaxed);
            let response = match tokio::time::timeout(timeout, service.correct(request)).await {
                Ok(result) => result?,
                Err(_) => {
                    timeouts_ref.fetch_add(1, Ordering::Relaxed);
                    return Err(CorrectionError::Timeout(timeout));
                }
            };
            response.check_well_formed(request)?;
            Ok::<_, CorrectionError>(response)
        };

        let retrying = attempt
            .retry(self.config.retry.backoff())
            .sleep(tokio::time::sleep)
            .when(CorrectionError::is_transient)
            .notify(|err: &CorrectionError, delay: Duration| {
                tracing::warn!(
                    service = service.name(),
                    error = %err,
                    delay = ?delay,
                    "Correction call failed, retrying"
                );
            });

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(CorrectionError::Cancelled),
            result = retrying => result,
        };

        let stats = CallStats {
            calls: calls.load(Ordering::Relaxed),
            timeouts: timeouts.load(Ordering::Relaxed),
        };
        (result, stats)
    }

    async fn validate_tagged(
        &self,
        template: &Template,
        document: &Document,
        approximate: &BTreeSet<String>,
    ) -> ValidationReport {
        let report = match &self.cache {
            Some(cache) => cache.get_or_validate(template, document).await.as_ref().clone(),
            None => conform_core::validate(document, template),
        };
        report.with_approximate(approximate.iter().cloned())
    }
}

/// Builder for the refinement orchestrator.
pub struct RefinementOrchestratorBuilder {
    templates: Option<Arc<dyn TemplateSource>>,
    service: Option<Arc<dyn CorrectionService>>,
    fallback: Option<LocalRepairFallback>,
    config: RuntimeConfig,
}

impl RefinementOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            templates: None,
            service: None,
            fallback: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Where templates are loaded from.
    pub fn templates(mut self, templates: Arc<dyn TemplateSource>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// The correction service. Without one every round uses local repair.
    pub fn service(mut self, service: Arc<dyn CorrectionService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn fallback(mut self, fallback: LocalRepairFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<RefinementOrchestrator, ConfigError> {
        let templates = self
            .templates
            .ok_or(ConfigError::MissingComponent("template source"))?;
        self.config.validate()?;

        if self.service.is_none() {
            tracing::warn!("No correction service configured; refinement will use local repair only");
        }

        let cache = self
            .config
            .cache
            .enabled
            .then(|| ValidationCache::new(self.config.cache.max_entries, self.config.cache.ttl));

        Ok(RefinementOrchestrator {
            templates,
            service: self.service,
            fallback: self.fallback.unwrap_or_default(),
            circuit_breaker: CircuitBreaker::new(self.config.circuit_breaker.clone()),
            cache,
            config: self.config,
        })
    }
}

impl Default for RefinementOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
