//! Profile sync engine: optimistic local mutation with debounced,
//! best-effort reconciliation against the remote store.

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::LocalCacheStore;
use crate::errors::{EngineError, GatewayError, Result};
use crate::identity::IdentityKey;
use crate::profile::{
    Account, Budget, FinancialProfile, ProfileMutation, ProfileStore, RecurringItem, SavingsGoal,
    SpendingEntry, SpendingSummary,
};
use crate::sync::gateway::{EntityKind, ProfileRow, RemoteGateway};
use crate::sync::reconcile::{self, RemoteIdSets, SyncPlan};
use crate::sync::scheduler::{PersistenceScheduler, DEFAULT_QUIESCENCE_WINDOW};

/// Outcome of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Remote store and cache both reflect the flushed state.
    Flushed,
    /// Cache was written; a transient remote failure was swallowed. The next
    /// mutation-triggered flush retries naturally; there is no retry loop.
    RemoteUnavailable,
    /// Cache was written; the remote store rejected the writes outright
    /// (bad payload, auth). Also swallowed, but retrying is unlikely to help
    /// until local state changes.
    RemoteRejected,
    /// Flush belonged to a superseded identity epoch and was discarded.
    Superseded,
    /// No identity resolved yet; nothing to persist against.
    NoIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    pub status: FlushStatus,
    pub upserted: usize,
    pub deleted: usize,
    pub duration_ms: i64,
}

impl FlushOutcome {
    fn skipped(status: FlushStatus) -> Self {
        Self {
            status,
            upserted: 0,
            deleted: 0,
            duration_ms: 0,
        }
    }
}

struct EngineState {
    /// Bumped on every identity switch; flushes scheduled under an older
    /// epoch are discarded.
    epoch: u64,
    identity: Option<IdentityKey>,
    store: ProfileStore,
    remote_ids: RemoteIdSets,
}

/// Owns the live profile and coordinates mutation, scheduling and
/// reconciliation. Single logical mutator; persistence runs as background
/// tasks that never block the next mutation.
pub struct ProfileSyncEngine {
    state: StdMutex<EngineState>,
    gateway: Arc<dyn RemoteGateway>,
    cache: Arc<dyn LocalCacheStore>,
    scheduler: Arc<PersistenceScheduler>,
}

impl ProfileSyncEngine {
    pub fn new(gateway: Arc<dyn RemoteGateway>, cache: Arc<dyn LocalCacheStore>) -> Arc<Self> {
        Self::with_quiescence_window(gateway, cache, DEFAULT_QUIESCENCE_WINDOW)
    }

    pub fn with_quiescence_window(
        gateway: Arc<dyn RemoteGateway>,
        cache: Arc<dyn LocalCacheStore>,
        window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: StdMutex::new(EngineState {
                epoch: 0,
                identity: None,
                store: ProfileStore::new(FinancialProfile::empty(Utc::now())),
                remote_ids: RemoteIdSets::default(),
            }),
            gateway,
            cache,
            scheduler: PersistenceScheduler::new(window),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current profile snapshot.
    pub fn profile(&self) -> FinancialProfile {
        self.lock_state().store.snapshot()
    }

    /// Change notifications: a snapshot per applied mutation or load.
    pub fn subscribe(&self) -> watch::Receiver<FinancialProfile> {
        self.lock_state().store.subscribe()
    }

    pub fn identity(&self) -> Option<IdentityKey> {
        self.lock_state().identity.clone()
    }

    /// Switch the active identity and load-or-create its profile.
    ///
    /// Pending and queued flushes for the previous identity are cancelled;
    /// in-flight results are discarded via the epoch check. Remote errors
    /// degrade to the cache path rather than failing the load.
    pub async fn resolve_identity(self: &Arc<Self>, identity: IdentityKey) -> FinancialProfile {
        self.scheduler.cancel();
        let epoch = {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.identity = Some(identity.clone());
            state.epoch
        };

        let (profile, remote_ids) = self.load_profile(&identity).await;

        let mut state = self.lock_state();
        if state.epoch != epoch {
            // Another switch happened while we were loading.
            return state.store.snapshot();
        }
        state.remote_ids = remote_ids;
        state.store.replace(profile);
        state.store.snapshot()
    }

    /// Load path: remote first, then cache, then a fresh empty aggregate.
    async fn load_profile(&self, identity: &IdentityKey) -> (FinancialProfile, RemoteIdSets) {
        match self.gateway.fetch_profile(identity).await {
            Ok(Some(row)) => match self.assemble_remote_profile(row).await {
                Ok(loaded) => {
                    // Remote id wins over whatever the cache held; mirroring
                    // rewrites the conflicting entry.
                    if let Ok(Some(cached)) = self.cache.get(identity) {
                        if cached.id != loaded.0.id {
                            info!(
                                "[ProfileSync] Cached profile id {} superseded by remote id {}",
                                cached.id, loaded.0.id
                            );
                        }
                    }
                    if let Err(err) = self.cache.set(identity, &loaded.0) {
                        warn!("[ProfileSync] Cache mirror failed on load: {}", err);
                    }
                    loaded
                }
                Err(err) => self.cache_fallback(identity, err),
            },
            Ok(None) => {
                debug!("[ProfileSync] No remote profile for {}", identity);
                match self.cache.get(identity) {
                    Ok(Some(cached)) => (cached, RemoteIdSets::default()),
                    Ok(None) => (FinancialProfile::empty(Utc::now()), RemoteIdSets::default()),
                    Err(err) => {
                        warn!("[ProfileSync] Cache read failed for {}: {}", identity, err);
                        (FinancialProfile::empty(Utc::now()), RemoteIdSets::default())
                    }
                }
            }
            Err(err) => self.cache_fallback(identity, err),
        }
    }

    fn cache_fallback(
        &self,
        identity: &IdentityKey,
        err: GatewayError,
    ) -> (FinancialProfile, RemoteIdSets) {
        warn!(
            "[ProfileSync] Remote load failed for {}; falling back to cache: {}",
            identity, err
        );
        let profile = self
            .cache
            .get(identity)
            .ok()
            .flatten()
            .unwrap_or_else(|| FinancialProfile::empty(Utc::now()));
        // Remote id sets are unknown; the next successful flush resends
        // everything and issues no deletes.
        (profile, RemoteIdSets::default())
    }

    /// Fetch the owned collections and rebuild the aggregate around the
    /// remote-assigned profile id.
    async fn assemble_remote_profile(
        &self,
        row: ProfileRow,
    ) -> std::result::Result<(FinancialProfile, RemoteIdSets), GatewayError> {
        let profile_id = row.id.clone();
        let mut profile = FinancialProfile::empty(row.last_updated);
        profile.id = row.id;
        profile.name = row.name;
        profile.income = row.income;
        profile.has_completed_onboarding = row.has_completed_onboarding;
        profile.last_updated = row.last_updated;

        profile.accounts =
            parse_rows::<Account>(self.fetch(EntityKind::Accounts, &profile_id).await?);
        profile.budgets = parse_rows::<Budget>(self.fetch(EntityKind::Budgets, &profile_id).await?);
        profile.recurring_items =
            parse_rows::<RecurringItem>(self.fetch(EntityKind::RecurringItems, &profile_id).await?);
        profile.goals =
            parse_rows::<SavingsGoal>(self.fetch(EntityKind::Goals, &profile_id).await?);
        profile.spending_entries =
            parse_rows::<SpendingEntry>(self.fetch(EntityKind::SpendingEntries, &profile_id).await?);
        profile.spending_summaries = parse_rows::<SpendingSummary>(
            self.fetch(EntityKind::SpendingSummaries, &profile_id).await?,
        );

        profile.recompute_derived();
        let remote_ids = RemoteIdSets::from_profile(&profile);
        Ok((profile, remote_ids))
    }

    async fn fetch(
        &self,
        kind: EntityKind,
        profile_id: &str,
    ) -> std::result::Result<Vec<Value>, GatewayError> {
        self.gateway.fetch_collection(kind, profile_id).await
    }

    /// Apply a mutation optimistically and reset the quiescence timer.
    /// Returns the new snapshot immediately; persistence happens later.
    pub fn apply(self: &Arc<Self>, mutation: ProfileMutation) -> FinancialProfile {
        let (snapshot, epoch, has_identity) = {
            let mut state = self.lock_state();
            let snapshot = state.store.apply(mutation);
            (snapshot, state.epoch, state.identity.is_some())
        };
        // No flush while identity resolution is in flight.
        if has_identity {
            self.schedule_flush(epoch);
        }
        snapshot
    }

    /// Privileged path: apply the mutation, cancel the pending timer and
    /// flush before returning, using the state at this very call.
    pub async fn apply_now(self: &Arc<Self>, mutation: ProfileMutation) -> Result<FinancialProfile> {
        let epoch = {
            let mut state = self.lock_state();
            state.store.apply(mutation);
            if state.identity.is_none() {
                return Err(EngineError::IdentityUnresolved);
            }
            state.epoch
        };
        self.flush_now_for_epoch(epoch).await;
        Ok(self.profile())
    }

    /// Preempt the debounce window and flush the current state.
    pub async fn flush_now(self: &Arc<Self>) -> Result<FlushOutcome> {
        let epoch = {
            let state = self.lock_state();
            if state.identity.is_none() {
                return Err(EngineError::IdentityUnresolved);
            }
            state.epoch
        };
        let engine = Arc::clone(self);
        let outcome = Arc::new(StdMutex::new(FlushOutcome::skipped(FlushStatus::NoIdentity)));
        let slot = Arc::clone(&outcome);
        self.scheduler
            .run_now(move || async move {
                let result = engine.flush(epoch).await;
                *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = result;
            })
            .await;
        let outcome = outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(outcome)
    }

    async fn flush_now_for_epoch(self: &Arc<Self>, epoch: u64) {
        let engine = Arc::clone(self);
        self.scheduler
            .run_now(move || async move {
                engine.flush(epoch).await;
            })
            .await;
    }

    fn schedule_flush(self: &Arc<Self>, epoch: u64) {
        let engine = Arc::clone(self);
        self.scheduler.schedule(move || async move {
            engine.flush(epoch).await;
        });
    }

    /// One flush: mirror to cache, then reconcile and push to the remote
    /// store. Reads the full state at execution time, not scheduling time.
    async fn flush(&self, epoch: u64) -> FlushOutcome {
        let started_at = std::time::Instant::now();
        let (identity, profile, remote_ids) = {
            let state = self.lock_state();
            if state.epoch != epoch {
                return FlushOutcome::skipped(FlushStatus::Superseded);
            }
            let Some(identity) = state.identity.clone() else {
                return FlushOutcome::skipped(FlushStatus::NoIdentity);
            };
            (identity, state.store.snapshot(), state.remote_ids.clone())
        };

        // Write-through mirror happens on every attempt, independent of the
        // remote outcome.
        if let Err(err) = self.cache.set(&identity, &profile) {
            warn!("[ProfileSync] Cache write-through failed: {}", err);
        }

        let plan = reconcile::plan(&profile, &remote_ids);
        let row = ProfileRow::from_profile(&profile, &identity);
        match self.push_plan(&row, plan).await {
            Ok((upserted, deleted)) => {
                let mut state = self.lock_state();
                if state.epoch == epoch {
                    state.remote_ids = RemoteIdSets::from_profile(&profile);
                }
                let duration_ms = started_at.elapsed().as_millis() as i64;
                debug!(
                    "[ProfileSync] Flush complete for {}: upserted={} deleted={} duration_ms={}",
                    identity, upserted, deleted, duration_ms
                );
                FlushOutcome {
                    status: FlushStatus::Flushed,
                    upserted,
                    deleted,
                    duration_ms,
                }
            }
            Err(err) => {
                // Swallowed either way: the cache stays authoritative and the
                // next mutation-triggered flush retries.
                let status = if err.is_transient() {
                    FlushStatus::RemoteUnavailable
                } else {
                    FlushStatus::RemoteRejected
                };
                warn!(
                    "[ProfileSync] Remote flush failed for {} ({:?}); cache remains authoritative: {}",
                    identity, status, err
                );
                FlushOutcome {
                    status,
                    upserted: 0,
                    deleted: 0,
                    duration_ms: started_at.elapsed().as_millis() as i64,
                }
            }
        }
    }

    /// Push scalars first (the profile row anchors the collections), then the
    /// per-kind deletes/upserts, then the rollup swap.
    async fn push_plan(
        &self,
        row: &ProfileRow,
        plan: SyncPlan,
    ) -> std::result::Result<(usize, usize), GatewayError> {
        let mut upserted = 0usize;
        let mut deleted = 0usize;

        self.gateway.upsert_profile(row).await?;
        for collection in plan.collections {
            if !collection.deletes.is_empty() {
                deleted += collection.deletes.len();
                self.gateway
                    .delete_rows(collection.kind, collection.deletes)
                    .await?;
            }
            if !collection.upserts.is_empty() {
                upserted += collection.upserts.len();
                self.gateway
                    .upsert_rows(collection.kind, collection.upserts)
                    .await?;
            }
        }

        // Rollup rows have no stable id: full delete-for-profile, then a full
        // insert of the current rows.
        self.gateway
            .delete_profile_rows(EntityKind::SpendingSummaries, &row.id)
            .await?;
        if !plan.summary_rows.is_empty() {
            upserted += plan.summary_rows.len();
            self.gateway
                .upsert_rows(EntityKind::SpendingSummaries, plan.summary_rows)
                .await?;
        }

        Ok((upserted, deleted))
    }

    /// Explicit account deletion: remove everything remote and cached for the
    /// current identity and reset to a fresh aggregate. Unlike flushes,
    /// remote failures here surface to the caller.
    pub async fn delete_profile(self: &Arc<Self>) -> Result<()> {
        self.scheduler.cancel();
        let (identity, profile_id) = {
            let mut state = self.lock_state();
            let Some(identity) = state.identity.clone() else {
                return Err(EngineError::IdentityUnresolved);
            };
            // Discard any in-flight flush results for the old aggregate.
            state.epoch += 1;
            (identity, state.store.snapshot().id)
        };

        for kind in [
            EntityKind::Accounts,
            EntityKind::Budgets,
            EntityKind::RecurringItems,
            EntityKind::Goals,
            EntityKind::SpendingEntries,
            EntityKind::SpendingSummaries,
        ] {
            self.gateway
                .delete_profile_rows(kind, &profile_id)
                .await
                .map_err(EngineError::Gateway)?;
        }
        self.gateway
            .delete_profile(&profile_id)
            .await
            .map_err(EngineError::Gateway)?;
        self.cache.clear(&identity).map_err(EngineError::Cache)?;

        let mut state = self.lock_state();
        state.remote_ids = RemoteIdSets::default();
        state.store.replace(FinancialProfile::empty(Utc::now()));
        info!("[ProfileSync] Profile {} deleted for {}", profile_id, identity);
        Ok(())
    }
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!("[ProfileSync] Skipping unreadable remote row: {}", err);
                None
            }
        })
        .collect()
}
