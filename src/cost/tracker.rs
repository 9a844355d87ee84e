use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Datelike, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::telemetry;

/// Fraction of a limit at which a warning is published.
pub const DEFAULT_WARNING_RATIO: f64 = 0.8;

/// Records older than this are dropped from the ledger.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

const EVENT_CAPACITY: usize = 32;

/// Spending ceilings. `None` leaves that axis unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLimits {
    #[serde(default)]
    pub daily: Option<f64>,
    #[serde(default)]
    pub monthly: Option<f64>,
    #[serde(default)]
    pub per_request: Option<f64>,
}

impl CostLimits {
    /// No limits at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn daily(mut self, limit: f64) -> Self {
        self.daily = Some(limit);
        self
    }

    pub fn monthly(mut self, limit: f64) -> Self {
        self.monthly = Some(limit);
        self
    }

    pub fn per_request(mut self, limit: f64) -> Self {
        self.per_request = Some(limit);
        self
    }
}

/// One metered provider call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Local>,
    pub provider: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
    #[serde(default)]
    pub cached: bool,
}

/// Which limit an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAxis {
    PerRequest,
    Daily,
    Monthly,
}

impl BudgetAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetAxis::PerRequest => "request",
            BudgetAxis::Daily => "daily",
            BudgetAxis::Monthly => "monthly",
        }
    }
}

impl fmt::Display for BudgetAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals published by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BudgetEvent {
    /// A pre-flight check was refused.
    LimitExceeded {
        axis: BudgetAxis,
        limit: f64,
        used: f64,
        requested: f64,
    },
    /// Recorded usage crossed the warning ratio of a limit.
    Warning {
        axis: BudgetAxis,
        limit: f64,
        used: f64,
    },
}

impl fmt::Display for BudgetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetEvent::LimitExceeded {
                axis,
                limit,
                used,
                requested,
            } => write!(
                f,
                "{axis} limit {limit:.4} would be exceeded (used {used:.4}, requested {requested:.4})"
            ),
            BudgetEvent::Warning { axis, limit, used } => {
                write!(f, "{axis} usage {used:.4} is nearing the limit {limit:.4}")
            }
        }
    }
}

/// Budget left in each period. `None` when that axis is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RemainingBudget {
    pub daily: Option<f64>,
    pub monthly: Option<f64>,
}

/// Usage ledger with budget enforcement.
///
/// Constructed once by the application and shared by `Arc`. The ledger is
/// only touched inside short synchronous sections.
pub struct CostTracker {
    limits: CostLimits,
    warning_ratio: f64,
    retention: TimeDelta,
    ledger: Mutex<Vec<UsageRecord>>,
    events: broadcast::Sender<BudgetEvent>,
}

impl CostTracker {
    pub fn new(limits: CostLimits) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            limits,
            warning_ratio: DEFAULT_WARNING_RATIO,
            retention: TimeDelta::days(DEFAULT_RETENTION_DAYS),
            ledger: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Override the warning ratio (default 0.8).
    pub fn with_warning_ratio(mut self, ratio: f64) -> Self {
        self.warning_ratio = ratio;
        self
    }

    /// Override how long records are kept (default 90 days).
    pub fn with_retention(mut self, retention: TimeDelta) -> Self {
        self.retention = retention;
        self
    }

    pub fn limits(&self) -> &CostLimits {
        &self.limits
    }

    /// Receive rejections and warnings from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BudgetEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UsageRecord>> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a call estimated at `estimated_cost` fits every limit.
    ///
    /// On refusal a [`BudgetEvent::LimitExceeded`] is published.
    pub fn can_proceed(&self, estimated_cost: f64) -> bool {
        match self.check(estimated_cost, Local::now()) {
            None => true,
            Some(event) => {
                if let BudgetEvent::LimitExceeded { axis, .. } = &event {
                    metrics::counter!(telemetry::BUDGET_REJECTIONS_TOTAL, "axis" => axis.as_str())
                        .increment(1);
                }
                warn!(%event, "budget check refused request");
                let _ = self.events.send(event);
                false
            }
        }
    }

    fn check(&self, estimate: f64, now: DateTime<Local>) -> Option<BudgetEvent> {
        if let Some(limit) = self.limits.per_request
            && estimate > limit
        {
            return Some(BudgetEvent::LimitExceeded {
                axis: BudgetAxis::PerRequest,
                limit,
                used: 0.0,
                requested: estimate,
            });
        }

        let ledger = self.lock();
        let periods = [
            (BudgetAxis::Daily, self.limits.daily, sum_daily(&ledger, now)),
            (
                BudgetAxis::Monthly,
                self.limits.monthly,
                sum_monthly(&ledger, now),
            ),
        ];
        periods.into_iter().find_map(|(axis, limit, used)| {
            let limit = limit?;
            (used + estimate > limit).then_some(BudgetEvent::LimitExceeded {
                axis,
                limit,
                used,
                requested: estimate,
            })
        })
    }

    /// Append a usage record stamped with the current local time.
    pub fn record_usage(
        &self,
        provider: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost: f64,
        cached: bool,
    ) {
        self.record(UsageRecord {
            timestamp: Local::now(),
            provider: provider.to_string(),
            input_tokens,
            output_tokens,
            cost,
            cached,
        });
    }

    /// Append an already-stamped record, e.g. one restored from storage.
    ///
    /// Publishes a [`BudgetEvent::Warning`] for each period whose usage
    /// crosses the warning ratio with this record, then prunes records
    /// older than the retention window.
    pub fn record(&self, record: UsageRecord) {
        let now = Local::now();
        metrics::gauge!(telemetry::COST_RECORDED, "provider" => record.provider.clone())
            .increment(record.cost);
        debug!(
            provider = %record.provider,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost = record.cost,
            cached = record.cached,
            "recording usage"
        );

        let warnings = {
            let mut ledger = self.lock();
            let daily_before = sum_daily(&ledger, now);
            let monthly_before = sum_monthly(&ledger, now);
            ledger.push(record);
            let daily_after = sum_daily(&ledger, now);
            let monthly_after = sum_monthly(&ledger, now);

            let cutoff = now - self.retention;
            ledger.retain(|r| r.timestamp >= cutoff);

            [
                (BudgetAxis::Daily, self.limits.daily, daily_before, daily_after),
                (
                    BudgetAxis::Monthly,
                    self.limits.monthly,
                    monthly_before,
                    monthly_after,
                ),
            ]
            .into_iter()
            .filter_map(|(axis, limit, before, after)| {
                let limit = limit?;
                let threshold = limit * self.warning_ratio;
                (before < threshold && after >= threshold).then_some(BudgetEvent::Warning {
                    axis,
                    limit,
                    used: after,
                })
            })
            .collect::<Vec<_>>()
        };

        for event in warnings {
            warn!(%event, "budget warning");
            let _ = self.events.send(event);
        }
    }

    /// Cost recorded during the current local calendar day.
    pub fn daily_usage(&self) -> f64 {
        sum_daily(&self.lock(), Local::now())
    }

    /// Cost recorded during the current local calendar month.
    pub fn monthly_usage(&self) -> f64 {
        sum_monthly(&self.lock(), Local::now())
    }

    /// Total cost across the retained ledger.
    pub fn total_cost(&self) -> f64 {
        self.lock().iter().map(|r| r.cost).sum()
    }

    pub fn remaining_budget(&self) -> RemainingBudget {
        let now = Local::now();
        let ledger = self.lock();
        RemainingBudget {
            daily: self
                .limits
                .daily
                .map(|limit| (limit - sum_daily(&ledger, now)).max(0.0)),
            monthly: self
                .limits
                .monthly
                .map(|limit| (limit - sum_monthly(&ledger, now)).max(0.0)),
        }
    }

    /// Snapshot of the retained ledger, oldest first.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.lock().clone()
    }
}

fn sum_daily(ledger: &[UsageRecord], now: DateTime<Local>) -> f64 {
    let today = now.date_naive();
    ledger
        .iter()
        .filter(|r| r.timestamp.date_naive() == today)
        .map(|r| r.cost)
        .sum()
}

fn sum_monthly(ledger: &[UsageRecord], now: DateTime<Local>) -> f64 {
    ledger
        .iter()
        .filter(|r| r.timestamp.year() == now.year() && r.timestamp.month() == now.month())
        .map(|r| r.cost)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(timestamp: DateTime<Local>, cost: f64) -> UsageRecord {
        UsageRecord {
            timestamp,
            provider: "test".into(),
            input_tokens: 10,
            output_tokens: 10,
            cost,
            cached: false,
        }
    }

    #[test]
    fn daily_sum_ignores_other_days() {
        let now = Local::now();
        let ledger = vec![
            record_at(now, 1.0),
            record_at(now - TimeDelta::days(1), 5.0),
        ];
        assert_eq!(sum_daily(&ledger, now), 1.0);
    }

    #[test]
    fn monthly_sum_ignores_other_months() {
        let now = Local::now();
        let ledger = vec![
            record_at(now, 2.0),
            record_at(now - TimeDelta::days(40), 7.0),
        ];
        assert_eq!(sum_monthly(&ledger, now), 2.0);
    }

    #[test]
    fn check_reports_first_failing_axis() {
        let tracker = CostTracker::new(CostLimits::unbounded().daily(1.0).monthly(1.0));
        let event = tracker.check(2.0, Local::now());
        assert!(matches!(
            event,
            Some(BudgetEvent::LimitExceeded {
                axis: BudgetAxis::Daily,
                ..
            })
        ));
    }
}
