//! Provider chain with availability-probe fallback.
//!
//! The `ProviderChain` holds every configured adapter by name and an
//! ordered list of names to try. Selection walks that list and returns the
//! first provider whose [`is_available`](AssistProvider::is_available)
//! probe succeeds.
//!
//! # Order
//!
//! With a primary set, the order is `[primary, ...fallback_order]` with the
//! primary removed from the fallback list and duplicates dropped. Without
//! one, providers are tried in registration order.
//!
//! ```text
//! primary = "openai", fallback = ["ollama", "openai", "anthropic"]
//!
//!   openai ──probe fails──► ollama ──probe fails──► anthropic ──► selected
//!                                                        │
//!                                        probe fails ────┴──► NoProviderAvailable
//! ```
//!
//! Selection only probes; it does not fall back on generation failures.
//! Transient generation errors are the queue's business.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::traits::AssistProvider;
use crate::{NudgeError, Result};

/// Named adapters plus the order to try them in.
#[derive(Default, Clone)]
pub struct ProviderChain {
    providers: HashMap<String, Arc<dyn AssistProvider>>,
    registered: Vec<String>,
    order: Vec<String>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider under its own [`name`](AssistProvider::name).
    ///
    /// Registering a second provider with the same name replaces the first.
    pub fn register(&mut self, provider: Arc<dyn AssistProvider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_none() {
            self.registered.push(name);
        }
    }

    /// Set the explicit try order.
    pub fn set_order(&mut self, primary: Option<&str>, fallback_order: &[String]) {
        let mut order: Vec<String> = Vec::new();
        for name in primary.into_iter().chain(fallback_order.iter().map(String::as_str)) {
            if !order.iter().any(|n| n == name) {
                order.push(name.to_string());
            }
        }
        self.order = order;
    }

    /// Names in the order they will be tried.
    ///
    /// Names without a registered provider are skipped.
    pub fn order(&self) -> Vec<&str> {
        let names = if self.order.is_empty() {
            &self.registered
        } else {
            &self.order
        };
        names
            .iter()
            .filter(|n| self.providers.contains_key(n.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AssistProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, in registration order.
    pub fn provider_names(&self) -> &[String] {
        &self.registered
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// First provider in order whose probe succeeds.
    #[instrument(skip(self))]
    pub async fn select(&self) -> Result<Arc<dyn AssistProvider>> {
        for name in self.order() {
            let Some(provider) = self.providers.get(name) else {
                continue;
            };
            if provider.is_available().await {
                debug!(provider = name, "provider selected");
                return Ok(Arc::clone(provider));
            }
            warn!(provider = name, "provider unavailable, trying next");
        }
        Err(NudgeError::NoProviderAvailable)
    }

    /// Whether any provider in the chain is currently reachable.
    pub async fn any_available(&self) -> bool {
        self.select().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::types::{AssistRequest, Generation};

    struct Fixed {
        name: &'static str,
        up: bool,
    }

    #[async_trait]
    impl AssistProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _request: &AssistRequest) -> Result<Generation> {
            Err(NudgeError::Unsupported)
        }

        fn estimate_cost(&self, _input: u32, _output: u32) -> f64 {
            0.0
        }

        async fn is_available(&self) -> bool {
            self.up
        }
    }

    fn chain(up: &[(&'static str, bool)]) -> ProviderChain {
        let mut chain = ProviderChain::new();
        for (name, up) in up {
            chain.register(Arc::new(Fixed { name, up: *up }));
        }
        chain
    }

    #[test]
    fn primary_goes_first_and_is_not_repeated() {
        let mut chain = chain(&[("a", true), ("b", true), ("c", true)]);
        chain.set_order(Some("b"), &["c".into(), "b".into(), "a".into()]);
        assert_eq!(chain.order(), vec!["b", "c", "a"]);
    }

    #[test]
    fn unregistered_names_are_skipped() {
        let mut chain = chain(&[("a", true)]);
        chain.set_order(Some("ghost"), &["a".into()]);
        assert_eq!(chain.order(), vec!["a"]);
    }

    #[tokio::test]
    async fn select_skips_unavailable() {
        let mut chain = chain(&[("a", false), ("b", true)]);
        chain.set_order(Some("a"), &["b".into()]);
        assert_eq!(chain.select().await.unwrap().name(), "b");
    }

    #[tokio::test]
    async fn select_fails_when_nothing_is_up() {
        let chain = chain(&[("a", false)]);
        assert!(matches!(
            chain.select().await,
            Err(NudgeError::NoProviderAvailable)
        ));
        assert!(!chain.any_available().await);
    }
}
