//! Nudge - AI request orchestration for a personal task manager
//!
//! This crate sits between the task manager and its language-model
//! backends. Feature code asks for a result ("shrink this task", "say
//! something encouraging"); the [`Orchestrator`] decides whether a cached
//! answer will do, which provider to call, whether the budget allows it,
//! and when the call runs relative to other work.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nudge::providers::OllamaProvider;
//! use nudge::{AssistResponse, Mood, Orchestrator, ShrinkRequest};
//!
//! #[tokio::main]
//! async fn main() -> nudge::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .provider(Arc::new(OllamaProvider::new()))
//!         .build()?;
//!
//!     let request = ShrinkRequest::new("write quarterly report").mood(Mood::Low);
//!     if let AssistResponse::Shrink(result) = orchestrator.request(request.into()).await? {
//!         for step in result.steps {
//!             println!("{} ({} min)", step.action, step.estimated_minutes);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Components
//!
//! - [`queue`]: priority queue with bounded concurrency and retry/backoff
//! - [`cache`]: TTL cache with fuzzy lookup
//! - [`cost`]: usage ledger and budget limits
//! - [`providers`]: backend adapters and the provider chain
//! - [`config`]: TOML configuration

pub mod cache;
pub mod config;
pub mod cost;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod queue;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use config::{OrchestratorConfig, ProviderConfig};
pub use error::{NudgeError, Result};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorStats};

pub use cache::{CacheConfig, CacheStats, ResponseCache};
pub use cost::{BudgetEvent, CostLimits, CostTracker, RemainingBudget};
pub use providers::{AssistProvider, Pricing, ProviderChain};
pub use queue::{QueueConfig, RequestQueue, RetryPolicy};

pub use types::{
    AssistRequest, AssistResponse, Difficulty, Encouragement, EncouragementContext,
    EncouragementRequest, EnergyLevel, Generation, Mood, RequestKind, ShrinkRequest,
    ShrinkResult, ShrinkStep, StreamEvent, Tone, Usage,
};
