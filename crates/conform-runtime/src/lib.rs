//! # conform-runtime
//!
//! Async refinement runtime for conform.
//!
//! This crate drives documents toward a conformance threshold by pairing the
//! deterministic validator from `conform-core` with an external correction
//! service:
//! - Worst-first focus sections per round
//! - Section-level merge that never touches unflagged sections
//! - Exponential backoff and per-call timeouts
//! - Circuit breaker per correction service
//! - Local structural repair when the service cannot help
//! - Cooperative cancellation
//!
//! ## Example
//!
//! ```rust,ignore
//! use conform_core::{Document, TemplateRegistry, BUILTIN_TEMPLATE};
//! use conform_runtime::{LlmCorrectionService, RefinementOrchestrator, RuntimeConfig};
//! use std::sync::Arc;
//!
//! let orchestrator = RefinementOrchestrator::builder()
//!     .templates(Arc::new(TemplateRegistry::with_builtin()?))
//!     .service(Arc::new(LlmCorrectionService::new(provider)))
//!     .config(RuntimeConfig::from_yaml_file("conform.yaml")?)
//!     .build()?;
//!
//! let result = orchestrator
//!     .refine(&document, BUILTIN_TEMPLATE, orchestrator.default_options())
//!     .await?;
//! println!("{:?}: {}", result.status, result.final_report.render_text());
//! ```

pub mod cache;
pub mod config;
pub mod correction;
pub mod merge;
pub mod orchestrator;
pub mod prompts;
pub mod resilience;

pub use cache::{CacheKey, ValidationCache};
pub use config::{CacheConfig, ConfigError, RetryConfig, RuntimeConfig};
pub use correction::{
    ChatMessage, CompletionConfig, CompletionResponse, CorrectionError, CorrectionRequest,
    CorrectionResponse, CorrectionService, LlmCorrectionService, LlmProvider, ProviderError,
    TokenUsage,
};
pub use merge::{merge_flagged, MergeOutcome};
pub use orchestrator::{
    AttemptOutcome, RefineOptions, RefinementAttempt, RefinementOrchestrator,
    RefinementOrchestratorBuilder, RefinementResult, RefinementState, RefinementStatus,
};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CorrectionUsage, LlmUsage};

// Re-export core for convenience
pub use conform_core;
