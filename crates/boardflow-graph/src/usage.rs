use serde::{Deserialize, Serialize};

use boardflow_core::types::NodeResult;

/// Aggregate token usage for a whole run, split by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    // Routing stage, summed across nodes
    pub router_prompt_tokens: u64,
    pub router_completion_tokens: u64,
    pub router_total_tokens: u64,
    // Worker stage, summed across nodes
    pub worker_prompt_tokens: u64,
    pub worker_completion_tokens: u64,
    pub worker_total_tokens: u64,
    // Both stages
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageSummary {
    /// Fold usage counters out of a run's node results.
    pub fn accumulate<'a>(results: impl IntoIterator<Item = &'a NodeResult>) -> Self {
        let mut summary = Self::default();
        for r in results {
            summary.router_prompt_tokens += r.router_prompt_tokens;
            summary.router_completion_tokens += r.router_completion_tokens;
            summary.router_total_tokens += r.router_total_tokens;
            summary.worker_prompt_tokens += r.prompt_tokens;
            summary.worker_completion_tokens += r.completion_tokens;
            summary.worker_total_tokens += r.total_tokens;
        }
        summary.total_prompt_tokens = summary.router_prompt_tokens + summary.worker_prompt_tokens;
        summary.total_completion_tokens =
            summary.router_completion_tokens + summary.worker_completion_tokens;
        summary.total_tokens = summary.router_total_tokens + summary.worker_total_tokens;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardflow_core::types::{TokenUsage, WorkerKind};

    #[test]
    fn test_accumulate_splits_stages() {
        let a = NodeResult::from_worker(WorkerKind::Text, "x".into(), None)
            .with_worker_usage(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            })
            .with_router_usage(TokenUsage {
                prompt_tokens: 2,
                completion_tokens: 1,
                total_tokens: 3,
            });
        let b = NodeResult::routed_error("down").with_router_usage(TokenUsage {
            prompt_tokens: 4,
            completion_tokens: 2,
            total_tokens: 6,
        });

        let summary = UsageSummary::accumulate([&a, &b]);
        assert_eq!(summary.router_total_tokens, 9);
        assert_eq!(summary.worker_total_tokens, 15);
        assert_eq!(summary.total_tokens, 24);
        assert_eq!(summary.total_prompt_tokens, 16);
        assert_eq!(summary.total_completion_tokens, 8);
    }

    #[test]
    fn test_accumulate_empty_is_zero() {
        let summary = UsageSummary::accumulate([]);
        assert_eq!(summary, UsageSummary::default());
    }
}
