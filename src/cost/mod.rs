//! Spend accounting.
//!
//! [`CostTracker`] keeps an append-only ledger of [`UsageRecord`]s and
//! answers one question before every provider call: does this estimate fit
//! the per-request, daily and monthly [`CostLimits`]? Rejections and 80%
//! warnings are published as [`BudgetEvent`]s on a broadcast channel so a
//! settings screen can react without polling.

mod tracker;

pub use tracker::{
    BudgetAxis, BudgetEvent, CostLimits, CostTracker, RemainingBudget, UsageRecord,
    DEFAULT_RETENTION_DAYS, DEFAULT_WARNING_RATIO,
};
