//! Remote CRUD gateway contract.
//!
//! The managed relational store is consumed exclusively through this narrow
//! contract; its storage engine is out of scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GatewayError;
use crate::identity::IdentityKey;
use crate::profile::{FinancialProfile, Income};

/// Entity kinds the remote store persists for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Accounts,
    Budgets,
    RecurringItems,
    Goals,
    SpendingEntries,
    /// Replace-all variant: rows have no stable id, they are keyed by
    /// (profile, category) and swapped wholesale on every flush.
    SpendingSummaries,
}

impl EntityKind {
    /// Kinds reconciled by id-diffing, in flush order.
    pub const ID_DIFFED: [EntityKind; 4] = [
        EntityKind::Accounts,
        EntityKind::Budgets,
        EntityKind::RecurringItems,
        EntityKind::Goals,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Budgets => "budgets",
            Self::RecurringItems => "recurring_items",
            Self::Goals => "goals",
            Self::SpendingEntries => "spending_entries",
            Self::SpendingSummaries => "spending_summaries",
        }
    }
}

/// Scalar profile row as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub id: String,
    pub identity_key: String,
    pub name: String,
    pub income: Option<Income>,
    pub has_completed_onboarding: bool,
    pub data_completeness: u8,
    pub last_updated: DateTime<Utc>,
}

impl ProfileRow {
    pub fn from_profile(profile: &FinancialProfile, identity: &IdentityKey) -> Self {
        Self {
            id: profile.id.clone(),
            identity_key: identity.storage_key(),
            name: profile.name.clone(),
            income: profile.income.clone(),
            has_completed_onboarding: profile.has_completed_onboarding,
            data_completeness: profile.data_completeness,
            last_updated: profile.last_updated,
        }
    }
}

/// CRUD contract over the remote relational store.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch the scalar profile row for an identity. `Ok(None)` when the
    /// identity has no remote row yet.
    async fn fetch_profile(
        &self,
        identity: &IdentityKey,
    ) -> Result<Option<ProfileRow>, GatewayError>;

    /// Fetch all rows of one collection for a profile.
    async fn fetch_collection(
        &self,
        kind: EntityKind,
        profile_id: &str,
    ) -> Result<Vec<Value>, GatewayError>;

    /// Upsert the scalar profile row.
    async fn upsert_profile(&self, row: &ProfileRow) -> Result<(), GatewayError>;

    /// Upsert full rows for one collection.
    async fn upsert_rows(&self, kind: EntityKind, rows: Vec<Value>) -> Result<(), GatewayError>;

    /// Delete rows of one collection by id.
    async fn delete_rows(&self, kind: EntityKind, ids: Vec<String>) -> Result<(), GatewayError>;

    /// Delete every row of one collection for a profile (replace-all support).
    async fn delete_profile_rows(
        &self,
        kind: EntityKind,
        profile_id: &str,
    ) -> Result<(), GatewayError>;

    /// Delete the scalar profile row (explicit account deletion).
    async fn delete_profile(&self, profile_id: &str) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_wire_names_match_backend_contract() {
        let actual = [
            EntityKind::Accounts,
            EntityKind::Budgets,
            EntityKind::RecurringItems,
            EntityKind::Goals,
            EntityKind::SpendingEntries,
            EntityKind::SpendingSummaries,
        ]
        .iter()
        .map(|kind| serde_json::to_string(kind).expect("serialize entity kind"))
        .collect::<Vec<_>>();

        let expected = vec![
            "\"accounts\"",
            "\"budgets\"",
            "\"recurring_items\"",
            "\"goals\"",
            "\"spending_entries\"",
            "\"spending_summaries\"",
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn wire_name_agrees_with_serde() {
        for kind in [
            EntityKind::Accounts,
            EntityKind::Budgets,
            EntityKind::RecurringItems,
            EntityKind::Goals,
            EntityKind::SpendingEntries,
            EntityKind::SpendingSummaries,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.wire_name());
        }
    }
}
