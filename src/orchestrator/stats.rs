//! Running request statistics.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::types::Usage;

/// Snapshot of what the orchestrator has done since it was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorStats {
    pub total_requests: u64,
    /// Requests answered from a cache.
    pub cached_responses: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    /// Sum of post-call cost estimates, in currency units.
    pub estimated_cost: f64,
    /// Provider calls per provider name, successful or not.
    pub provider_requests: HashMap<String, u64>,
    /// `cached_responses / total_requests`, 0 before the first request.
    pub cache_hit_rate: f64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    inner: Mutex<OrchestratorStats>,
}

impl StatsRecorder {
    fn lock(&self) -> MutexGuard<'_, OrchestratorStats> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cached(&self) {
        let mut stats = self.lock();
        stats.total_requests += 1;
        stats.cached_responses += 1;
    }

    pub fn completed(&self, provider: &str, usage: Usage, cost: f64) {
        let mut stats = self.lock();
        stats.total_requests += 1;
        stats.total_tokens += u64::from(usage.input_tokens) + u64::from(usage.output_tokens);
        stats.estimated_cost += cost;
        *stats
            .provider_requests
            .entry(provider.to_string())
            .or_default() += 1;
    }

    /// `provider` is `None` when the request never reached one.
    pub fn failed(&self, provider: Option<&str>) {
        let mut stats = self.lock();
        stats.total_requests += 1;
        stats.failed_requests += 1;
        if let Some(provider) = provider {
            *stats
                .provider_requests
                .entry(provider.to_string())
                .or_default() += 1;
        }
    }

    pub fn snapshot(&self) -> OrchestratorStats {
        let mut snapshot = self.lock().clone();
        snapshot.cache_hit_rate = if snapshot.total_requests == 0 {
            0.0
        } else {
            snapshot.cached_responses as f64 / snapshot.total_requests as f64
        };
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_counts_cached_over_total() {
        let stats = StatsRecorder::default();
        assert_eq!(stats.snapshot().cache_hit_rate, 0.0);

        stats.completed("openai", Usage::new(10, 5), 0.01);
        stats.cached();
        stats.cached();
        stats.failed(Some("openai"));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.cached_responses, 2);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.total_tokens, 15);
        assert_eq!(snap.provider_requests.get("openai"), Some(&2));
        assert!((snap.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn huge_token_counts_do_not_overflow() {
        let stats = StatsRecorder::default();
        stats.completed("ollama", Usage::new(u32::MAX, u32::MAX), 0.0);
        assert_eq!(stats.snapshot().total_tokens, 2 * u64::from(u32::MAX));
    }
}
