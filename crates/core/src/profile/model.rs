//! Financial profile aggregate and its owned collections.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment / recurrence cadence shared by income and recurring items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

/// Scalar income descriptor on the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub amount: Decimal,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    Credit,
    Investment,
    Cash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub kind: AccountKind,
    pub balance: Decimal,
    pub currency: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub category: String,
    pub limit: Decimal,
    pub period: BudgetPeriod,
    /// Cache recomputed from the spending summaries; never authoritative input.
    pub spent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringItem {
    pub id: String,
    pub name: String,
    pub amount: Decimal,
    pub frequency: Frequency,
    pub next_due_date: NaiveDate,
    pub category: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGoal {
    pub id: String,
    pub name: String,
    pub target: Decimal,
    pub current: Decimal,
    pub deadline: Option<NaiveDate>,
    pub priority: GoalPriority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Expense,
    Income,
    Transfer,
}

/// Where a spending entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Manual,
    Statement,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingEntry {
    pub id: String,
    pub category: String,
    pub amount: Decimal,
    pub kind: EntryKind,
    pub date: NaiveDate,
    pub description: Option<String>,
    /// Weak reference to an account. The account may have been deleted since;
    /// consumers must treat a missing lookup as "unknown account".
    pub account_id: Option<String>,
    pub confidence: f64,
    pub source: EntrySource,
}

/// Derived category rollup. Keyed by `category`, one row per category; it has
/// no stable row id of its own and is replaced wholesale on sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSummary {
    pub category: String,
    pub total: Decimal,
    pub confidence: f64,
}

/// Aggregate root. Unit of load/save for all owned collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialProfile {
    pub id: String,
    pub name: String,
    pub income: Option<Income>,
    pub has_completed_onboarding: bool,
    /// Derived 0-100 score, recomputed on every mutation.
    pub data_completeness: u8,
    pub last_updated: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub budgets: Vec<Budget>,
    pub recurring_items: Vec<RecurringItem>,
    pub goals: Vec<SavingsGoal>,
    pub spending_entries: Vec<SpendingEntry>,
    pub spending_summaries: Vec<SpendingSummary>,
}

impl FinancialProfile {
    /// Fresh empty aggregate with a newly assigned row id.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            income: None,
            has_completed_onboarding: false,
            data_completeness: 0,
            last_updated: now,
            accounts: Vec::new(),
            budgets: Vec::new(),
            recurring_items: Vec::new(),
            goals: Vec::new(),
            spending_entries: Vec::new(),
            spending_summaries: Vec::new(),
        }
    }

    /// Weak-reference lookup. May miss for since-deleted accounts.
    pub fn account_by_id(&self, account_id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == account_id)
    }

    pub fn summary_for(&self, category: &str) -> Option<&SpendingSummary> {
        self.spending_summaries
            .iter()
            .find(|s| s.category == category)
    }

    /// Recompute every derived field from the owned collections.
    ///
    /// `Budget.spent` mirrors the summary total for the budget's category
    /// (zero when no summary row exists). Runs after spending mutations and
    /// after a full remote load.
    pub fn recompute_derived(&mut self) {
        let totals: Vec<(String, Decimal)> = self
            .spending_summaries
            .iter()
            .map(|s| (s.category.clone(), s.total))
            .collect();
        for budget in &mut self.budgets {
            budget.spent = totals
                .iter()
                .find(|(category, _)| *category == budget.category)
                .map(|(_, total)| *total)
                .unwrap_or(Decimal::ZERO);
        }
        self.data_completeness = self.compute_data_completeness();
    }

    /// Weighted presence score over the profile's sections.
    fn compute_data_completeness(&self) -> u8 {
        let mut score = 0u8;
        if !self.name.trim().is_empty() {
            score += 10;
        }
        if self.income.is_some() {
            score += 15;
        }
        if !self.accounts.is_empty() {
            score += 20;
        }
        if !self.budgets.is_empty() {
            score += 15;
        }
        if !self.recurring_items.is_empty() {
            score += 10;
        }
        if !self.goals.is_empty() {
            score += 15;
        }
        if !self.spending_entries.is_empty() {
            score += 15;
        }
        score
    }
}
