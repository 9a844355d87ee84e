//! Builder for configuring orchestrator instances

use std::sync::Arc;
use std::time::Duration;

use super::Orchestrator;
use super::stats::StatsRecorder;
use crate::cache::{CacheConfig, ResponseCache};
use crate::cost::{CostLimits, CostTracker};
use crate::providers::{AssistProvider, ProviderChain};
use crate::queue::{QueueConfig, RequestQueue, RetryPolicy};
use crate::{NudgeError, Result};

/// Fuzzy threshold for the shrink cache: stricter than the cache default,
/// since two different tasks with similar titles need different steps.
pub const SHRINK_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Builder for [`Orchestrator`].
///
/// Providers are registered as ready-made adapters, so tests can plug in
/// mocks and applications can share one HTTP client across them.
pub struct OrchestratorBuilder {
    chain: ProviderChain,
    primary: Option<String>,
    fallback_order: Vec<String>,
    cache: CacheConfig,
    cache_enabled: bool,
    shrink_similarity: f64,
    queue: QueueConfig,
    queue_enabled: bool,
    cost_limits: CostLimits,
    cost_tracker: Option<Arc<CostTracker>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            chain: ProviderChain::new(),
            primary: None,
            fallback_order: Vec::new(),
            cache: CacheConfig::default(),
            cache_enabled: true,
            shrink_similarity: SHRINK_SIMILARITY_THRESHOLD,
            queue: QueueConfig::default(),
            queue_enabled: true,
            cost_limits: CostLimits::default(),
            cost_tracker: None,
        }
    }

    /// Register a provider under its own name.
    pub fn provider(mut self, provider: Arc<dyn AssistProvider>) -> Self {
        self.chain.register(provider);
        self
    }

    /// Provider to try first.
    pub fn primary(mut self, name: impl Into<String>) -> Self {
        self.primary = Some(name.into());
        self
    }

    /// Providers to try, in order, when the primary is unavailable.
    pub fn fallback_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_order = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable both response caches (default: enabled).
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Default TTL for cached answers (default: 1 hour).
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    /// Fuzzy threshold for shrink lookups (default: 0.85).
    pub fn shrink_similarity(mut self, threshold: f64) -> Self {
        self.shrink_similarity = threshold;
        self
    }

    /// Route provider calls through a priority queue (default: enabled).
    ///
    /// Without the queue, calls run immediately and are never retried.
    pub fn queue_enabled(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.queue = config;
        self
    }

    /// Maximum provider calls in flight (default: 2).
    pub fn concurrency(mut self, n: usize) -> Self {
        self.queue.concurrency = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.queue.retry = policy;
        self
    }

    /// Spend limits for a tracker owned by this orchestrator.
    ///
    /// Ignored when [`cost_tracker`](Self::cost_tracker) is set.
    pub fn cost_limits(mut self, limits: CostLimits) -> Self {
        self.cost_limits = limits;
        self
    }

    /// Share an existing tracker, e.g. one that outlives the orchestrator.
    pub fn cost_tracker(mut self, tracker: Arc<CostTracker>) -> Self {
        self.cost_tracker = Some(tracker);
        self
    }

    /// Build the orchestrator.
    ///
    /// Fails when no provider is registered or when the primary or a
    /// fallback name does not match a registered provider.
    pub fn build(self) -> Result<Orchestrator> {
        let mut chain = self.chain;
        if chain.is_empty() {
            return Err(NudgeError::Configuration(
                "no providers configured".to_string(),
            ));
        }
        for name in self.primary.iter().chain(self.fallback_order.iter()) {
            if !chain.contains(name) {
                return Err(NudgeError::Configuration(format!(
                    "unknown provider '{name}'"
                )));
            }
        }
        if self.primary.is_some() || !self.fallback_order.is_empty() {
            chain.set_order(self.primary.as_deref(), &self.fallback_order);
        }

        let (shrink_cache, encouragement_cache) = if self.cache_enabled {
            let shrink = self
                .cache
                .clone()
                .similarity_threshold(self.shrink_similarity);
            (
                Some(ResponseCache::new(shrink)),
                Some(ResponseCache::new(self.cache)),
            )
        } else {
            (None, None)
        };

        let queue = self
            .queue_enabled
            .then(|| RequestQueue::new(self.queue.clone()));

        let cost = self
            .cost_tracker
            .unwrap_or_else(|| Arc::new(CostTracker::new(self.cost_limits)));

        Ok(Orchestrator {
            chain: Arc::new(chain),
            queue,
            max_retries: self.queue.retry.max_retries,
            shrink_cache,
            encouragement_cache,
            cost,
            stats: StatsRecorder::default(),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
