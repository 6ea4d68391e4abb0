//! Usage accounting for correction rounds and LLM calls.

use serde::{Deserialize, Serialize};

use crate::correction::TokenUsage;

/// Counters for one refinement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionUsage {
    /// Correction rounds executed
    pub rounds: u32,

    /// Calls made to the correction service, retries included
    pub service_calls: u32,

    /// Calls beyond the first in a round
    pub retries: u32,

    /// Calls that hit the request timeout
    pub timeouts: u32,

    /// Rounds that ended in local repair
    pub fallbacks: u32,

    /// Rounds that skipped the service because its circuit was open
    pub circuit_skips: u32,
}

impl CorrectionUsage {
    /// Fold another run's counters into this one.
    pub fn merge(&mut self, other: &CorrectionUsage) {
        self.rounds += other.rounds;
        self.service_calls += other.service_calls;
        self.retries += other.retries;
        self.timeouts += other.timeouts;
        self.fallbacks += other.fallbacks;
        self.circuit_skips += other.circuit_skips;
    }
}

/// Accumulated token usage for an LLM-backed correction service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Number of completions requested
    pub llm_calls: u32,

    /// Completions that read from the provider's prompt cache
    pub cache_hits: u32,

    pub cache_read_tokens: u32,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.cache_read_tokens += usage.cache_read_tokens;

        if usage.cache_read_tokens > 0 {
            self.cache_hits += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_usage_accumulates() {
        let mut usage = LlmUsage::default();
        usage.add(&TokenUsage {
            prompt_tokens: 1200,
            completion_tokens: 300,
            cache_read_tokens: 0,
        });
        usage.add(&TokenUsage {
            prompt_tokens: 400,
            completion_tokens: 250,
            cache_read_tokens: 800,
        });

        assert_eq!(usage.llm_calls, 2);
        assert_eq!(usage.prompt_tokens, 1600);
        assert_eq!(usage.total_tokens, 2150);
        assert_eq!(usage.cache_hits, 1);
        assert_eq!(usage.cache_read_tokens, 800);
    }

    #[test]
    fn test_correction_usage_merge() {
        let mut total = CorrectionUsage {
            rounds: 2,
            service_calls: 4,
            retries: 2,
            ..Default::default()
        };
        total.merge(&CorrectionUsage {
            rounds: 1,
            service_calls: 3,
            retries: 2,
            timeouts: 3,
            fallbacks: 1,
            circuit_skips: 0,
        });

        assert_eq!(total.rounds, 3);
        assert_eq!(total.service_calls, 7);
        assert_eq!(total.timeouts, 3);
        assert_eq!(total.fallbacks, 1);
    }
}
