//! Spend and token accounting with advisory budgets.

use super::GenerationResult;
use crate::config::{BudgetConfig, ProviderId};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Totals for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    /// Calls served (cache hits excluded).
    pub calls: u64,
    /// Tokens billed.
    pub tokens: u64,
    /// Estimated spend in USD.
    pub cost_usd: f64,
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    /// Spend today (UTC).
    pub daily_cost_usd: f64,
    /// Spend this month (UTC).
    pub monthly_cost_usd: f64,
    /// Totals per provider since start.
    pub providers: BTreeMap<ProviderId, ProviderUsage>,
}

#[derive(Debug)]
struct Ledger {
    day: NaiveDate,
    month: (i32, u32),
    daily_cost: f64,
    monthly_cost: f64,
    daily_warned: bool,
    monthly_warned: bool,
    providers: BTreeMap<ProviderId, ProviderUsage>,
}

/// Records spend and warns when a ceiling is crossed. Never blocks calls.
#[derive(Debug)]
pub struct UsageTracker {
    budget: BudgetConfig,
    ledger: Mutex<Ledger>,
}

impl UsageTracker {
    /// Creates a tracker.
    #[must_use]
    pub fn new(budget: BudgetConfig) -> Self {
        let now = Utc::now();
        Self {
            budget,
            ledger: Mutex::new(Ledger {
                day: now.date_naive(),
                month: (now.year(), now.month()),
                daily_cost: 0.0,
                monthly_cost: 0.0,
                daily_warned: false,
                monthly_warned: false,
                providers: BTreeMap::new(),
            }),
        }
    }

    /// Records one successful call.
    pub fn record(&self, result: &GenerationResult) {
        self.record_at(result, Utc::now());
    }

    fn record_at(&self, result: &GenerationResult, now: DateTime<Utc>) {
        if result.cached {
            return;
        }
        let mut ledger = self.ledger.lock();
        if ledger.day != now.date_naive() {
            ledger.day = now.date_naive();
            ledger.daily_cost = 0.0;
            ledger.daily_warned = false;
        }
        if ledger.month != (now.year(), now.month()) {
            ledger.month = (now.year(), now.month());
            ledger.monthly_cost = 0.0;
            ledger.monthly_warned = false;
        }
        ledger.daily_cost += result.estimated_cost_usd;
        ledger.monthly_cost += result.estimated_cost_usd;
        let entry = ledger.providers.entry(result.provider).or_default();
        entry.calls += 1;
        entry.tokens += u64::from(result.tokens_used);
        entry.cost_usd += result.estimated_cost_usd;

        if !ledger.daily_warned && ledger.daily_cost > self.budget.daily_limit_usd {
            ledger.daily_warned = true;
            warn!(
                spent = ledger.daily_cost,
                limit = self.budget.daily_limit_usd,
                "Daily model budget exceeded"
            );
        }
        if !ledger.monthly_warned && ledger.monthly_cost > self.budget.monthly_limit_usd {
            ledger.monthly_warned = true;
            warn!(
                spent = ledger.monthly_cost,
                limit = self.budget.monthly_limit_usd,
                "Monthly model budget exceeded"
            );
        }
    }

    /// Returns true if either ceiling has been crossed in the current period.
    #[must_use]
    pub fn over_budget(&self) -> bool {
        let ledger = self.ledger.lock();
        ledger.daily_cost > self.budget.daily_limit_usd
            || ledger.monthly_cost > self.budget.monthly_limit_usd
    }

    /// Current totals.
    #[must_use]
    pub fn snapshot(&self) -> UsageSnapshot {
        let ledger = self.ledger.lock();
        UsageSnapshot {
            daily_cost_usd: ledger.daily_cost,
            monthly_cost_usd: ledger.monthly_cost,
            providers: ledger.providers.clone(),
        }
    }
}
