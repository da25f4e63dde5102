//! Reconciliation: compute the write set that makes the remote store match
//! local state.
//!
//! Every locally present row is always resent in full (no per-field dirty
//! tracking); deletes are the remote ids no longer present locally. Two
//! deliberate asymmetries from the id-diffed rule:
//! - spending summaries have no stable row id and are synced by
//!   delete-all-then-insert-all for the profile;
//! - spending entries are upsert-only: entries removed from the in-memory
//!   profile are never deleted remotely.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::profile::FinancialProfile;
use crate::sync::gateway::EntityKind;

/// Remote id sets observed at the last successful sync, per id-diffed kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteIdSets {
    pub accounts: HashSet<String>,
    pub budgets: HashSet<String>,
    pub recurring_items: HashSet<String>,
    pub goals: HashSet<String>,
}

impl RemoteIdSets {
    /// Id sets for the current local state; adopted after a successful flush.
    pub fn from_profile(profile: &FinancialProfile) -> Self {
        Self {
            accounts: profile.accounts.iter().map(|a| a.id.clone()).collect(),
            budgets: profile.budgets.iter().map(|b| b.id.clone()).collect(),
            recurring_items: profile
                .recurring_items
                .iter()
                .map(|r| r.id.clone())
                .collect(),
            goals: profile.goals.iter().map(|g| g.id.clone()).collect(),
        }
    }

    pub fn for_kind(&self, kind: EntityKind) -> Option<&HashSet<String>> {
        match kind {
            EntityKind::Accounts => Some(&self.accounts),
            EntityKind::Budgets => Some(&self.budgets),
            EntityKind::RecurringItems => Some(&self.recurring_items),
            EntityKind::Goals => Some(&self.goals),
            EntityKind::SpendingEntries | EntityKind::SpendingSummaries => None,
        }
    }
}

/// Upsert/delete operation set for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPlan {
    pub kind: EntityKind,
    pub upserts: Vec<Value>,
    pub deletes: Vec<String>,
}

/// Full write set for one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    /// Id-diffed collections plus the upsert-only spending entries.
    pub collections: Vec<CollectionPlan>,
    /// Category rollup rows, applied as delete-all-then-insert-all.
    pub summary_rows: Vec<Value>,
}

fn rows_with_profile_id<T: Serialize>(profile_id: &str, items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .map(|mut value| {
            if let Value::Object(object) = &mut value {
                object.insert(
                    "profileId".to_string(),
                    Value::String(profile_id.to_string()),
                );
            }
            value
        })
        .collect()
}

fn diff_deletes(remote: &HashSet<String>, local: &HashSet<String>) -> Vec<String> {
    let mut deletes: Vec<String> = remote.difference(local).cloned().collect();
    deletes.sort();
    deletes
}

/// Compute the write set for the current profile against the last-synced
/// remote id sets.
pub fn plan(profile: &FinancialProfile, remote: &RemoteIdSets) -> SyncPlan {
    let local = RemoteIdSets::from_profile(profile);
    let profile_id = profile.id.as_str();

    let mut collections = Vec::with_capacity(5);
    for kind in EntityKind::ID_DIFFED {
        let upserts = match kind {
            EntityKind::Accounts => rows_with_profile_id(profile_id, &profile.accounts),
            EntityKind::Budgets => rows_with_profile_id(profile_id, &profile.budgets),
            EntityKind::RecurringItems => {
                rows_with_profile_id(profile_id, &profile.recurring_items)
            }
            EntityKind::Goals => rows_with_profile_id(profile_id, &profile.goals),
            EntityKind::SpendingEntries | EntityKind::SpendingSummaries => unreachable!(),
        };
        let remote_ids = remote.for_kind(kind).cloned().unwrap_or_default();
        let local_ids = local.for_kind(kind).cloned().unwrap_or_default();
        collections.push(CollectionPlan {
            kind,
            upserts,
            deletes: diff_deletes(&remote_ids, &local_ids),
        });
    }

    // Historical spending entries are never deleted remotely.
    collections.push(CollectionPlan {
        kind: EntityKind::SpendingEntries,
        upserts: rows_with_profile_id(profile_id, &profile.spending_entries),
        deletes: Vec::new(),
    });

    SyncPlan {
        collections,
        summary_rows: rows_with_profile_id(profile_id, &profile.spending_summaries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{
        Account, AccountKind, EntryKind, EntrySource, SavingsGoal, GoalPriority, SpendingEntry,
        SpendingSummary,
    };
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            name: id.to_string(),
            kind: AccountKind::Savings,
            balance: dec!(10),
            currency: "USD".to_string(),
            is_primary: false,
        }
    }

    fn goal(id: &str) -> SavingsGoal {
        SavingsGoal {
            id: id.to_string(),
            name: id.to_string(),
            target: dec!(100),
            current: dec!(0),
            deadline: None,
            priority: GoalPriority::Medium,
            created_at: Utc::now(),
        }
    }

    fn entry(id: &str) -> SpendingEntry {
        SpendingEntry {
            id: id.to_string(),
            category: "misc".to_string(),
            amount: dec!(5),
            kind: EntryKind::Expense,
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            description: None,
            account_id: None,
            confidence: 1.0,
            source: EntrySource::Statement,
        }
    }

    fn plan_for(profile: &FinancialProfile, remote: &RemoteIdSets) -> SyncPlan {
        plan(profile, remote)
    }

    fn collection(plan: &SyncPlan, kind: EntityKind) -> &CollectionPlan {
        plan.collections
            .iter()
            .find(|c| c.kind == kind)
            .expect("plan covers kind")
    }

    #[test]
    fn deletes_are_remote_minus_local_and_upserts_are_all_local() {
        let mut profile = FinancialProfile::empty(Utc::now());
        profile.accounts = vec![account("a1"), account("a3")];

        let mut remote = RemoteIdSets::default();
        remote.accounts = ["a1", "a2"].iter().map(|s| s.to_string()).collect();

        let plan = plan_for(&profile, &remote);
        let accounts = collection(&plan, EntityKind::Accounts);
        assert_eq!(accounts.deletes, vec!["a2".to_string()]);
        // Full resend: both surviving and new rows are upserted.
        let upsert_ids: Vec<&str> = accounts
            .upserts
            .iter()
            .map(|row| row["id"].as_str().unwrap())
            .collect();
        assert_eq!(upsert_ids, vec!["a1", "a3"]);
    }

    #[test]
    fn each_kind_is_diffed_independently() {
        let mut profile = FinancialProfile::empty(Utc::now());
        profile.goals = vec![goal("g1")];

        let mut remote = RemoteIdSets::default();
        remote.accounts = ["a9"].iter().map(|s| s.to_string()).collect();
        remote.goals = ["g1"].iter().map(|s| s.to_string()).collect();

        let plan = plan_for(&profile, &remote);
        assert_eq!(
            collection(&plan, EntityKind::Accounts).deletes,
            vec!["a9".to_string()]
        );
        assert!(collection(&plan, EntityKind::Goals).deletes.is_empty());
    }

    #[test]
    fn spending_entries_are_upsert_only() {
        // Known divergence from the id-diffed collections: entries present
        // remotely but absent locally are left in place.
        let mut profile = FinancialProfile::empty(Utc::now());
        profile.spending_entries = vec![entry("e2")];

        let plan = plan_for(&profile, &RemoteIdSets::default());
        let entries = collection(&plan, EntityKind::SpendingEntries);
        assert!(entries.deletes.is_empty());
        assert_eq!(entries.upserts.len(), 1);
    }

    #[test]
    fn summary_rows_are_full_current_state_not_a_diff() {
        let mut profile = FinancialProfile::empty(Utc::now());
        profile.spending_summaries = vec![
            SpendingSummary {
                category: "groceries".to_string(),
                total: dec!(10),
                confidence: 1.0,
            },
            SpendingSummary {
                category: "transport".to_string(),
                total: dec!(20),
                confidence: 0.5,
            },
        ];

        let plan = plan_for(&profile, &RemoteIdSets::default());
        assert_eq!(plan.summary_rows.len(), 2);
        assert_eq!(plan.summary_rows[0]["category"], "groceries");
        assert_eq!(plan.summary_rows[0]["profileId"], profile.id);
    }

    #[test]
    fn rows_carry_the_profile_id() {
        let mut profile = FinancialProfile::empty(Utc::now());
        profile.accounts = vec![account("a1")];
        let plan = plan_for(&profile, &RemoteIdSets::default());
        let row = &collection(&plan, EntityKind::Accounts).upserts[0];
        assert_eq!(row["profileId"].as_str().unwrap(), profile.id);
    }

    #[test]
    fn empty_profile_produces_only_deletes() {
        let profile = FinancialProfile::empty(Utc::now());
        let mut remote = RemoteIdSets::default();
        remote.budgets = ["b1", "b2"].iter().map(|s| s.to_string()).collect();

        let plan = plan_for(&profile, &remote);
        let budgets = collection(&plan, EntityKind::Budgets);
        assert!(budgets.upserts.is_empty());
        assert_eq!(budgets.deletes, vec!["b1".to_string(), "b2".to_string()]);
    }
}
