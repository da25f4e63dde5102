//! Profile store: one mutable aggregate behind a closed mutation API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;

use super::model::{Account, Budget, FinancialProfile, Income, RecurringItem, SavingsGoal,
    SpendingEntry, SpendingSummary};

/// Closed set of mutations the engine accepts.
///
/// Applying a mutation is pure, synchronous and total: unknown ids make
/// updates and deletes no-ops, duplicate ids make adds no-ops. Deletes never
/// cascade across collections.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileMutation {
    SetName(String),
    SetIncome(Option<Income>),
    AddAccount(Account),
    UpdateAccount(Account),
    DeleteAccount { id: String },
    AddBudget(Budget),
    UpdateBudget(Budget),
    DeleteBudget { id: String },
    AddRecurringItem(RecurringItem),
    UpdateRecurringItem(RecurringItem),
    DeleteRecurringItem { id: String },
    AddGoal(SavingsGoal),
    UpdateGoal(SavingsGoal),
    DeleteGoal { id: String },
    AddSpendingEntry(SpendingEntry),
    AddSpendingSummaryDelta {
        category: String,
        amount: Decimal,
        confidence: f64,
    },
    MergeBulkSpendingEntries(Vec<SpendingEntry>),
    CompleteOnboarding,
    ResetProfile,
}

impl ProfileMutation {
    /// Privileged mutations must be durably flushed before the caller
    /// proceeds (they bypass the debounce window).
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::CompleteOnboarding)
    }
}

fn add_unique<T>(items: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> &str) {
    let id = id_of(&item).to_string();
    if !items.iter().any(|existing| id_of(existing) == id) {
        items.push(item);
    }
}

fn replace_by_id<T>(items: &mut [T], item: T, id_of: impl Fn(&T) -> &str) {
    let id = id_of(&item).to_string();
    if let Some(slot) = items.iter_mut().find(|existing| id_of(existing) == id) {
        *slot = item;
    }
}

/// Apply one mutation to the aggregate. Derived fields are recomputed and
/// `last_updated` is bumped afterwards.
pub fn apply_mutation(profile: &mut FinancialProfile, mutation: ProfileMutation, now: DateTime<Utc>) {
    match mutation {
        ProfileMutation::SetName(name) => profile.name = name,
        ProfileMutation::SetIncome(income) => profile.income = income,

        ProfileMutation::AddAccount(account) => {
            add_unique(&mut profile.accounts, account, |a| &a.id)
        }
        ProfileMutation::UpdateAccount(account) => {
            replace_by_id(&mut profile.accounts, account, |a| &a.id)
        }
        // No cascade: spending entries keep their (now dangling) account_id.
        ProfileMutation::DeleteAccount { id } => profile.accounts.retain(|a| a.id != id),

        ProfileMutation::AddBudget(budget) => add_unique(&mut profile.budgets, budget, |b| &b.id),
        ProfileMutation::UpdateBudget(budget) => {
            replace_by_id(&mut profile.budgets, budget, |b| &b.id)
        }
        ProfileMutation::DeleteBudget { id } => profile.budgets.retain(|b| b.id != id),

        ProfileMutation::AddRecurringItem(item) => {
            add_unique(&mut profile.recurring_items, item, |r| &r.id)
        }
        ProfileMutation::UpdateRecurringItem(item) => {
            replace_by_id(&mut profile.recurring_items, item, |r| &r.id)
        }
        ProfileMutation::DeleteRecurringItem { id } => {
            profile.recurring_items.retain(|r| r.id != id)
        }

        ProfileMutation::AddGoal(goal) => add_unique(&mut profile.goals, goal, |g| &g.id),
        ProfileMutation::UpdateGoal(goal) => replace_by_id(&mut profile.goals, goal, |g| &g.id),
        ProfileMutation::DeleteGoal { id } => profile.goals.retain(|g| g.id != id),

        ProfileMutation::AddSpendingEntry(entry) => {
            if profile.spending_entries.iter().any(|e| e.id == entry.id) {
                return;
            }
            if let Some(account_id) = entry.account_id.as_deref() {
                if let Some(account) = profile
                    .accounts
                    .iter_mut()
                    .find(|a| a.id == account_id)
                {
                    account.balance -= entry.amount;
                }
            }
            profile.spending_entries.push(entry);
        }

        ProfileMutation::AddSpendingSummaryDelta {
            category,
            amount,
            confidence,
        } => {
            match profile
                .spending_summaries
                .iter_mut()
                .find(|s| s.category == category)
            {
                Some(summary) => {
                    summary.total += amount;
                    summary.confidence = confidence;
                }
                None => profile.spending_summaries.push(SpendingSummary {
                    category,
                    total: amount,
                    confidence,
                }),
            }
        }

        ProfileMutation::MergeBulkSpendingEntries(entries) => {
            for entry in entries {
                add_unique(&mut profile.spending_entries, entry, |e| &e.id);
            }
        }

        // Monotonic: false -> true only.
        ProfileMutation::CompleteOnboarding => profile.has_completed_onboarding = true,

        // Fresh aggregate for the same identity; the remote row id is kept so
        // the next flush reuses the existing profile row.
        ProfileMutation::ResetProfile => {
            let id = profile.id.clone();
            *profile = FinancialProfile::empty(now);
            profile.id = id;
        }
    }

    profile.recompute_derived();
    profile.last_updated = now;
}

/// Owns the canonical in-memory profile. Single writer; exposes change
/// notifications instead of shared mutable references. Never performs I/O.
pub struct ProfileStore {
    profile: FinancialProfile,
    notifier: watch::Sender<FinancialProfile>,
}

impl ProfileStore {
    pub fn new(profile: FinancialProfile) -> Self {
        let notifier = watch::Sender::new(profile.clone());
        Self { profile, notifier }
    }

    pub fn snapshot(&self) -> FinancialProfile {
        self.profile.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FinancialProfile> {
        self.notifier.subscribe()
    }

    /// Apply a mutation and broadcast the new state. Returns a snapshot.
    pub fn apply(&mut self, mutation: ProfileMutation) -> FinancialProfile {
        apply_mutation(&mut self.profile, mutation, Utc::now());
        self.notifier.send_replace(self.profile.clone());
        self.profile.clone()
    }

    /// Replace the aggregate wholesale (load/bootstrap path).
    pub fn replace(&mut self, profile: FinancialProfile) {
        self.profile = profile;
        self.notifier.send_replace(self.profile.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::model::{AccountKind, BudgetPeriod, EntryKind, EntrySource};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn account(id: &str, balance: Decimal) -> Account {
        Account {
            id: id.to_string(),
            name: format!("Account {id}"),
            kind: AccountKind::Checking,
            balance,
            currency: "USD".to_string(),
            is_primary: false,
        }
    }

    fn entry(id: &str, amount: Decimal, account_id: Option<&str>) -> SpendingEntry {
        SpendingEntry {
            id: id.to_string(),
            category: "groceries".to_string(),
            amount,
            kind: EntryKind::Expense,
            date: NaiveDate::from_ymd_opt(2026, 8, 25).unwrap(),
            description: None,
            account_id: account_id.map(str::to_string),
            confidence: 1.0,
            source: EntrySource::Manual,
        }
    }

    fn apply(profile: &mut FinancialProfile, mutation: ProfileMutation) {
        apply_mutation(profile, mutation, Utc::now());
    }

    #[test]
    fn spending_entry_decrements_referenced_account_balance() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(&mut profile, ProfileMutation::AddAccount(account("a1", dec!(100))));
        apply(
            &mut profile,
            ProfileMutation::AddSpendingEntry(entry("e1", dec!(30), Some("a1"))),
        );
        assert_eq!(profile.accounts[0].balance, dec!(70));
    }

    #[test]
    fn spending_entry_with_unknown_account_is_kept_without_side_effect() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(
            &mut profile,
            ProfileMutation::AddSpendingEntry(entry("e1", dec!(30), Some("gone"))),
        );
        assert_eq!(profile.spending_entries.len(), 1);
    }

    #[test]
    fn deleting_account_leaves_dangling_entry_reference() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(&mut profile, ProfileMutation::AddAccount(account("a1", dec!(100))));
        apply(
            &mut profile,
            ProfileMutation::AddSpendingEntry(entry("e1", dec!(10), Some("a1"))),
        );
        apply(&mut profile, ProfileMutation::DeleteAccount { id: "a1".to_string() });

        assert!(profile.accounts.is_empty());
        assert_eq!(profile.spending_entries[0].account_id.as_deref(), Some("a1"));
        // Consumers treat the missing lookup as "unknown account".
        assert!(profile.account_by_id("a1").is_none());
    }

    #[test]
    fn duplicate_ids_are_dropped_on_add() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(&mut profile, ProfileMutation::AddAccount(account("a1", dec!(1))));
        apply(&mut profile, ProfileMutation::AddAccount(account("a1", dec!(2))));
        assert_eq!(profile.accounts.len(), 1);
        assert_eq!(profile.accounts[0].balance, dec!(1));
    }

    #[test]
    fn update_with_unknown_id_is_a_no_op() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(&mut profile, ProfileMutation::UpdateAccount(account("ghost", dec!(5))));
        assert!(profile.accounts.is_empty());
    }

    #[test]
    fn summary_delta_updates_rollup_and_matching_budget() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(
            &mut profile,
            ProfileMutation::AddBudget(Budget {
                id: "b1".to_string(),
                category: "groceries".to_string(),
                limit: dec!(400),
                period: BudgetPeriod::Monthly,
                spent: Decimal::ZERO,
            }),
        );
        apply(
            &mut profile,
            ProfileMutation::AddSpendingSummaryDelta {
                category: "groceries".to_string(),
                amount: dec!(25.50),
                confidence: 0.8,
            },
        );
        apply(
            &mut profile,
            ProfileMutation::AddSpendingSummaryDelta {
                category: "groceries".to_string(),
                amount: dec!(10),
                confidence: 0.9,
            },
        );

        let summary = profile.summary_for("groceries").unwrap();
        assert_eq!(summary.total, dec!(35.50));
        assert_eq!(summary.confidence, 0.9);
        assert_eq!(profile.budgets[0].spent, dec!(35.50));
    }

    #[test]
    fn bulk_merge_dedupes_against_existing_and_within_batch() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(
            &mut profile,
            ProfileMutation::AddSpendingEntry(entry("e1", dec!(1), None)),
        );
        apply(
            &mut profile,
            ProfileMutation::MergeBulkSpendingEntries(vec![
                entry("e1", dec!(99), None),
                entry("e2", dec!(2), None),
                entry("e2", dec!(99), None),
                entry("e3", dec!(3), None),
            ]),
        );
        let ids: Vec<&str> = profile.spending_entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
        assert_eq!(profile.spending_entries[0].amount, dec!(1));
    }

    #[test]
    fn onboarding_flag_is_monotonic() {
        let mut profile = FinancialProfile::empty(Utc::now());
        apply(&mut profile, ProfileMutation::CompleteOnboarding);
        assert!(profile.has_completed_onboarding);
        apply(&mut profile, ProfileMutation::CompleteOnboarding);
        assert!(profile.has_completed_onboarding);
    }

    #[test]
    fn reset_keeps_the_profile_row_id() {
        let mut profile = FinancialProfile::empty(Utc::now());
        let original_id = profile.id.clone();
        apply(&mut profile, ProfileMutation::AddAccount(account("a1", dec!(5))));
        apply(&mut profile, ProfileMutation::ResetProfile);
        assert_eq!(profile.id, original_id);
        assert!(profile.accounts.is_empty());
    }

    #[test]
    fn store_broadcasts_snapshots_to_subscribers() {
        let mut store = ProfileStore::new(FinancialProfile::empty(Utc::now()));
        let rx = store.subscribe();
        store.apply(ProfileMutation::SetName("Dana".to_string()));
        assert_eq!(rx.borrow().name, "Dana");
    }

    #[test]
    fn only_onboarding_completion_is_privileged() {
        assert!(ProfileMutation::CompleteOnboarding.is_privileged());
        assert!(!ProfileMutation::ResetProfile.is_privileged());
        assert!(!ProfileMutation::SetName(String::new()).is_privileged());
    }
}
