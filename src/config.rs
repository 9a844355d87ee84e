//! Configuration loading.
//!
//! Configuration is loaded from a TOML file with the following resolution
//! order:
//! 1. explicit path (e.g. the CLI `--config` flag)
//! 2. `~/.nudge/config.toml`
//!
//! Provider API keys may be left out of the file. They are then read from
//! `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`.
//!
//! ```toml
//! primary_provider = "openai"
//! fallback_order = ["ollama"]
//! queue_concurrency = 2
//!
//! [cost_limits]
//! daily = 1.0
//!
//! [[providers]]
//! type = "openai"
//! model = "gpt-4o-mini"
//!
//! [[providers]]
//! type = "ollama"
//! base_url = "http://localhost:11434"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::cache::CacheConfig;
use crate::cost::CostLimits;
use crate::orchestrator::{Orchestrator, OrchestratorBuilder, SHRINK_SIMILARITY_THRESHOLD};
use crate::providers::AssistProvider;
use crate::queue::{DEFAULT_CONCURRENCY, RetryPolicy};
use crate::{NudgeError, Result};

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider to try first (default: the first entry in `providers`).
    #[serde(default)]
    pub primary_provider: Option<String>,
    /// Providers to try, in order, when the primary is unavailable.
    #[serde(default)]
    pub fallback_order: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Cache entry lifetime in seconds (default: 3600).
    #[serde(default = "default_cache_ttl", alias = "cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Maximum entries per cache (default: 100).
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Fuzzy match threshold for shrink lookups, in `(0, 1]` (default: 0.85).
    #[serde(default = "default_shrink_similarity")]
    pub shrink_similarity: f64,
    /// Retries per request after the first attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled per retry (default: 1000).
    #[serde(default = "default_retry_delay", alias = "retry_delay")]
    pub retry_delay_ms: u64,
    /// Provider calls in flight at once (default: 2).
    #[serde(default = "default_concurrency")]
    pub queue_concurrency: usize,
    #[serde(default)]
    pub cost_limits: CostLimits,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            primary_provider: None,
            fallback_order: Vec::new(),
            providers: Vec::new(),
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl(),
            cache_max_entries: default_cache_max_entries(),
            shrink_similarity: default_shrink_similarity(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            queue_concurrency: default_concurrency(),
            cost_limits: CostLimits::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    100
}

fn default_shrink_similarity() -> f64 {
    SHRINK_SIMILARITY_THRESHOLD
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// One backend. Each variant carries only the fields its backend uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// OpenAI or any OpenAI-compatible server.
    OpenAi {
        /// Routing name (default: "openai").
        #[serde(default)]
        name: Option<String>,
        /// Falls back to `OPENAI_API_KEY`.
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Anthropic {
        /// Routing name (default: "anthropic").
        #[serde(default)]
        name: Option<String>,
        /// Falls back to `ANTHROPIC_API_KEY`.
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Ollama {
        /// Routing name (default: "ollama").
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

/// Provider type → environment variable holding its API key.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
];

impl ProviderConfig {
    /// Backend type as written in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAi { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::Ollama { .. } => "ollama",
        }
    }

    /// Name the provider is routed by.
    pub fn name(&self) -> &str {
        let name = match self {
            ProviderConfig::OpenAi { name, .. }
            | ProviderConfig::Anthropic { name, .. }
            | ProviderConfig::Ollama { name, .. } => name.as_deref(),
        };
        name.unwrap_or(self.kind())
    }

    /// Build the adapter, reading missing API keys from the environment.
    ///
    /// A keyless API provider is still built; it reports itself unavailable
    /// and the chain skips it.
    pub fn build(&self) -> Result<Arc<dyn AssistProvider>> {
        self.build_with(|var| std::env::var(var).ok())
    }

    fn build_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Arc<dyn AssistProvider>> {
        let api_key = |explicit: &Option<String>| -> String {
            let key = explicit.clone().or_else(|| {
                PROVIDER_ENV_VARS
                    .iter()
                    .find(|(kind, _)| *kind == self.kind())
                    .and_then(|(_, var)| env(var))
            });
            key.unwrap_or_else(|| {
                warn!(provider = self.name(), "no API key configured");
                String::new()
            })
        };

        match self {
            #[cfg(feature = "openai")]
            ProviderConfig::OpenAi {
                api_key: key,
                model,
                base_url,
                timeout_secs,
                ..
            } => {
                use crate::providers::openai::{DEFAULT_BASE_URL, OpenAiProvider};
                let base = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
                let mut provider =
                    OpenAiProvider::with_base_url(api_key(key), base).with_name(self.name());
                if let Some(model) = model {
                    provider = provider.model(model);
                }
                if let Some(secs) = timeout_secs {
                    provider = provider.timeout(Duration::from_secs(*secs));
                }
                Ok(Arc::new(provider))
            }
            #[cfg(feature = "anthropic")]
            ProviderConfig::Anthropic {
                api_key: key,
                model,
                base_url,
                timeout_secs,
                ..
            } => {
                use crate::providers::anthropic::{AnthropicProvider, DEFAULT_BASE_URL};
                let base = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
                let mut provider =
                    AnthropicProvider::with_base_url(api_key(key), base).with_name(self.name());
                if let Some(model) = model {
                    provider = provider.model(model);
                }
                if let Some(secs) = timeout_secs {
                    provider = provider.timeout(Duration::from_secs(*secs));
                }
                Ok(Arc::new(provider))
            }
            #[cfg(feature = "ollama")]
            ProviderConfig::Ollama {
                model,
                base_url,
                timeout_secs,
                ..
            } => {
                use crate::providers::ollama::{DEFAULT_BASE_URL, OllamaProvider};
                let base = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
                let mut provider = OllamaProvider::with_base_url(base).with_name(self.name());
                if let Some(model) = model {
                    provider = provider.model(model);
                }
                if let Some(secs) = timeout_secs {
                    provider = provider.timeout(Duration::from_secs(*secs));
                }
                Ok(Arc::new(provider))
            }
            #[allow(unreachable_patterns)]
            _ => Err(NudgeError::Configuration(format!(
                "provider type '{}' is not compiled in",
                self.kind()
            ))),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.nudge/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            NudgeError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            NudgeError::Configuration(msg) => {
                NudgeError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| NudgeError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(NudgeError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".nudge").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        Err(NudgeError::Configuration(
            "no config file found. Create ~/.nudge/config.toml".to_string(),
        ))
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(NudgeError::Configuration(msg));

        if self.queue_concurrency == 0 {
            return invalid("queue_concurrency must be at least 1".to_string());
        }
        if self.cache_max_entries == 0 {
            return invalid("cache_max_entries must be at least 1".to_string());
        }
        if !(self.shrink_similarity > 0.0 && self.shrink_similarity <= 1.0) {
            return invalid(format!(
                "shrink_similarity must be in (0, 1], got {}",
                self.shrink_similarity
            ));
        }

        let limits = [
            ("daily", self.cost_limits.daily),
            ("monthly", self.cost_limits.monthly),
            ("per_request", self.cost_limits.per_request),
        ];
        for (axis, limit) in limits {
            if let Some(limit) = limit
                && (limit < 0.0 || limit.is_nan())
            {
                return invalid(format!("cost_limits.{axis} must not be negative"));
            }
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name()) {
                return invalid(format!("duplicate provider name '{}'", provider.name()));
            }
        }
        for name in self.primary_provider.iter().chain(&self.fallback_order) {
            if !names.contains(name.as_str()) {
                return invalid(format!("unknown provider '{name}'"));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .max_retries(self.max_retries)
            .base_delay(Duration::from_millis(self.retry_delay_ms))
    }

    /// A builder with every provider and setting from this config applied.
    pub fn builder(&self) -> Result<OrchestratorBuilder> {
        self.validate()?;
        let mut builder = Orchestrator::builder()
            .cache_enabled(self.cache_enabled)
            .cache_config(
                CacheConfig::new()
                    .max_entries(self.cache_max_entries)
                    .ttl(Duration::from_secs(self.cache_ttl_secs)),
            )
            .shrink_similarity(self.shrink_similarity)
            .concurrency(self.queue_concurrency)
            .retry(self.retry_policy())
            .cost_limits(self.cost_limits)
            .fallback_order(self.fallback_order.iter().cloned());
        for provider in &self.providers {
            builder = builder.provider(provider.build()?);
        }
        if let Some(primary) = &self.primary_provider {
            builder = builder.primary(primary.clone());
        }
        Ok(builder)
    }
}

impl Orchestrator {
    /// Build an orchestrator from a loaded configuration.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        config.builder()?.build()
    }
}
