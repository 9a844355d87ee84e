//! Telemetry metric name constants.
//!
//! Centralised metric names for nudge operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `nudge_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "openai", "ollama")
//! - `kind`: request kind: "shrink" or "encourage"
//! - `status`: outcome: "ok" or "error"
//! - `direction`: token direction: "input" or "output"

/// Total requests handled by the orchestrator.
///
/// Labels: `kind`, `status` ("ok" | "error" | "cached").
pub const REQUESTS_TOTAL: &str = "nudge_requests_total";

/// Provider call duration in seconds.
///
/// Labels: `provider`, `kind`.
pub const REQUEST_DURATION_SECONDS: &str = "nudge_request_duration_seconds";

/// Total retry attempts scheduled by the queue (not counting the first run).
pub const RETRIES_TOTAL: &str = "nudge_retries_total";

/// Jobs that reached a terminal state in the queue.
///
/// Labels: `status` ("ok" | "error" | "cleared").
pub const JOBS_SETTLED_TOTAL: &str = "nudge_jobs_settled_total";

/// Total tokens metered.
///
/// Labels: `provider`, `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "nudge_tokens_total";

/// Estimated spend recorded in the usage ledger, in currency units (gauge).
///
/// Labels: `provider`.
pub const COST_RECORDED: &str = "nudge_cost_recorded";

/// Requests rejected by the budget.
///
/// Labels: `axis` ("request" | "daily" | "monthly").
pub const BUDGET_REJECTIONS_TOTAL: &str = "nudge_budget_rejections_total";

/// Total cache hits.
///
/// Labels: `lookup` ("exact" | "similar").
pub const CACHE_HITS_TOTAL: &str = "nudge_cache_hits_total";

/// Total cache misses.
///
/// Labels: `lookup` ("exact" | "similar").
pub const CACHE_MISSES_TOTAL: &str = "nudge_cache_misses_total";

/// Cache entries removed because the cache was full.
pub const CACHE_EVICTIONS_TOTAL: &str = "nudge_cache_evictions_total";
