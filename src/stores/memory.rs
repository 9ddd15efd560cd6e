//! In-process store implementations.
//!
//! One [`MemoryBackend`] implements every store contract over shared
//! state, the same way a deployment would point all repositories at one
//! database. Row exclusivity for balance mutations uses a per
//! (user, point type) async lock table held until commit or rollback,
//! giving the same interleaving guarantees as the Postgres store's
//! `SELECT ... FOR UPDATE`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::errors::{PointsError, Result};
use crate::models::{
    DistributionStatus, NewRedemptionRecord, NewRedemptionReward, NewRewardRule, NewTransaction,
    PointType, RedemptionRecord, RedemptionReward, RewardDistribution, RewardRule, Transaction,
    TransactionFilter, TransactionPage, UserBalance,
};
use crate::stores::{
    BalanceStore, BalanceTx, PointTypeStore, RankingStore, RedemptionStore, RewardStore,
};

type PairKey = (String, String);

#[derive(Default)]
struct State {
    point_types: Vec<PointType>,
    balances: HashMap<PairKey, UserBalance>,
    transactions: Vec<Transaction>,
    // point_type_id -> user_id -> (score, first-write sequence for tie order)
    rankings: HashMap<String, HashMap<String, (i64, u64)>>,
    rules: Vec<RewardRule>,
    distributions: Vec<RewardDistribution>,
    rewards: Vec<RedemptionReward>,
    records: Vec<RedemptionRecord>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
    seq: AtomicU64,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", prefix, n)
    }

    fn row_lock(&self, key: &PairKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.row_locks.lock().unwrap();
        locks.entry(key.clone()).or_default().clone()
    }
}

#[async_trait]
impl PointTypeStore for MemoryBackend {
    async fn create(&self, pt: &PointType) -> Result<String> {
        let mut state = self.inner.state.lock().unwrap();
        if state.point_types.iter().any(|p| p.name == pt.name) {
            return Err(PointsError::DuplicatePointTypeName);
        }
        let id = self.next_id("pt");
        state.point_types.push(PointType {
            id: id.clone(),
            name: pt.name.clone(),
            display_name: pt.display_name.clone(),
            description: pt.description.clone(),
            enabled: pt.enabled,
            deleted_at: None,
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn update(&self, pt: &PointType) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        let row = state
            .point_types
            .iter_mut()
            .find(|p| p.id == pt.id)
            .ok_or(PointsError::PointTypeNotFound)?;
        row.display_name = pt.display_name.clone();
        row.description = pt.description.clone();
        row.enabled = pt.enabled;
        Ok(())
    }

    async fn soft_delete(&self, name: &str, deleted_at: i64) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        let row = state
            .point_types
            .iter_mut()
            .find(|p| p.name == name && p.deleted_at.is_none())
            .ok_or(PointsError::PointTypeNotFound)?;
        row.deleted_at = Some(deleted_at);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PointType>> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.point_types.iter().find(|p| p.id == id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<PointType>> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.point_types.iter().find(|p| p.name == name).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<PointType>> {
        let state = self.inner.state.lock().unwrap();
        // Creation time descending; insertion order breaks same-second ties.
        let page = state
            .point_types
            .iter()
            .rev()
            .filter(|p| p.deleted_at.is_none())
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn has_balances(&self, point_type_id: &str) -> Result<bool> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.balances.keys().any(|(_, pt)| pt == point_type_id))
    }
}

pub struct MemoryBalanceTx {
    backend: MemoryBackend,
    guards: HashMap<PairKey, OwnedMutexGuard<()>>,
    staged_balances: HashMap<PairKey, UserBalance>,
    staged_transactions: Vec<Transaction>,
}

#[async_trait]
impl BalanceTx for MemoryBalanceTx {
    async fn balance_for_update(
        &mut self,
        user_id: &str,
        point_type_id: &str,
    ) -> Result<UserBalance> {
        let key = (user_id.to_string(), point_type_id.to_string());
        // Re-reading a pair already locked by this transaction must not
        // self-deadlock (the redemption engine reads each pair twice).
        if !self.guards.contains_key(&key) {
            let lock = self.backend.row_lock(&key);
            let guard = lock.lock_owned().await;
            self.guards.insert(key.clone(), guard);
        }
        if let Some(staged) = self.staged_balances.get(&key) {
            return Ok(staged.clone());
        }
        let state = self.backend.inner.state.lock().unwrap();
        Ok(state
            .balances
            .get(&key)
            .cloned()
            .unwrap_or_else(|| UserBalance::zero(user_id, point_type_id)))
    }

    async fn upsert_balance(&mut self, balance: &UserBalance) -> Result<()> {
        let key = (balance.user_id.clone(), balance.point_type_id.clone());
        self.staged_balances.insert(key, balance.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, entry: &NewTransaction) -> Result<String> {
        let id = self.backend.next_id("txn");
        self.staged_transactions.push(Transaction {
            id: id.clone(),
            user_id: entry.user_id.clone(),
            point_type_id: entry.point_type_id.clone(),
            amount: entry.amount,
            kind: entry.kind,
            reason: entry.reason.clone(),
            before: entry.before,
            after: entry.after,
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryBalanceTx {
            backend,
            guards,
            staged_balances,
            staged_transactions,
        } = *self;
        {
            let mut state = backend.inner.state.lock().unwrap();
            for (key, balance) in staged_balances {
                state.balances.insert(key, balance);
            }
            state.transactions.extend(staged_transactions);
        }
        // Row locks release only after the staged writes are visible.
        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn matches_filter(tx: &Transaction, user_id: &str, filter: &TransactionFilter) -> bool {
    if tx.user_id != user_id {
        return false;
    }
    if let Some(pt) = &filter.point_type_id {
        if &tx.point_type_id != pt {
            return false;
        }
    }
    if let Some(kind) = filter.kind {
        if tx.kind != kind {
            return false;
        }
    }
    if let Some(start) = filter.start_time {
        if tx.created_at < start {
            return false;
        }
    }
    if let Some(end) = filter.end_time {
        if tx.created_at > end {
            return false;
        }
    }
    true
}

#[async_trait]
impl BalanceStore for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn BalanceTx>> {
        Ok(Box::new(MemoryBalanceTx {
            backend: self.clone(),
            guards: HashMap::new(),
            staged_balances: HashMap::new(),
            staged_transactions: Vec::new(),
        }))
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage> {
        let state = self.inner.state.lock().unwrap();
        let matched: Vec<&Transaction> = state
            .transactions
            .iter()
            .filter(|tx| matches_filter(tx, user_id, filter))
            .collect();
        let total = matched.len() as i64;
        // Append order is timestamp order; newest first.
        let entries = matched
            .into_iter()
            .rev()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(TransactionPage { entries, total })
    }

    async fn get_balance(&self, user_id: &str, point_type_id: &str) -> Result<UserBalance> {
        let state = self.inner.state.lock().unwrap();
        let key = (user_id.to_string(), point_type_id.to_string());
        Ok(state
            .balances
            .get(&key)
            .cloned()
            .unwrap_or_else(|| UserBalance::zero(user_id, point_type_id)))
    }
}

#[async_trait]
impl RankingStore for MemoryBackend {
    async fn update_score(&self, point_type_id: &str, user_id: &str, score: i64) -> Result<()> {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.state.lock().unwrap();
        let pool = state.rankings.entry(point_type_id.to_string()).or_default();
        match pool.get_mut(user_id) {
            Some(entry) => entry.0 = score,
            None => {
                pool.insert(user_id.to_string(), (score, seq));
            }
        }
        Ok(())
    }

    async fn get_top(&self, point_type_id: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        if start < 0 || stop < start {
            return Ok(Vec::new());
        }
        let state = self.inner.state.lock().unwrap();
        let Some(pool) = state.rankings.get(point_type_id) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(&String, &(i64, u64))> = pool.iter().collect();
        // Descending score; first-write order breaks ties deterministically.
        entries.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        Ok(entries
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(user, _)| user.clone())
            .collect())
    }
}

#[async_trait]
impl RewardStore for MemoryBackend {
    async fn create_rule(&self, rule: &NewRewardRule) -> Result<String> {
        let id = self.next_id("rule");
        let mut state = self.inner.state.lock().unwrap();
        state.rules.push(RewardRule {
            id: id.clone(),
            point_type_id: rule.point_type_id.clone(),
            min_rank: rule.min_rank,
            max_rank: rule.max_rank,
            reward_amount: rule.reward_amount,
            reward_point_type_id: rule.reward_point_type_id.clone(),
            active: rule.active,
        });
        Ok(id)
    }

    async fn list_rules(&self, point_type_id: &str) -> Result<Vec<RewardRule>> {
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|r| r.point_type_id == point_type_id && r.active)
            .cloned()
            .collect())
    }

    async fn create_distribution(&self, snapshot_id: &str, executed_at: i64) -> Result<String> {
        let id = self.next_id("dist");
        let mut state = self.inner.state.lock().unwrap();
        state.distributions.push(RewardDistribution {
            id: id.clone(),
            snapshot_id: snapshot_id.to_string(),
            executed_at,
            status: DistributionStatus::Pending,
        });
        Ok(id)
    }

    async fn mark_distribution_completed(&self, distribution_id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        let dist = state
            .distributions
            .iter_mut()
            .find(|d| d.id == distribution_id)
            .ok_or_else(|| {
                PointsError::InvalidInput(format!("unknown distribution {}", distribution_id))
            })?;
        dist.status = DistributionStatus::Completed;
        Ok(())
    }
}

#[async_trait]
impl RedemptionStore for MemoryBackend {
    async fn create_reward(&self, reward: &NewRedemptionReward) -> Result<String> {
        let id = self.next_id("rwd");
        let mut state = self.inner.state.lock().unwrap();
        state.rewards.push(RedemptionReward {
            id: id.clone(),
            name: reward.name.clone(),
            description: reward.description.clone(),
            costs: reward.costs.clone(),
            quantity: reward.quantity,
            enabled: reward.enabled,
            total_redeemed: 0,
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<RedemptionReward>> {
        let state = self.inner.state.lock().unwrap();
        Ok(state.rewards.iter().find(|r| r.id == reward_id).cloned())
    }

    async fn decrement_inventory(&self, reward_id: &str, qty: i64) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        let reward = state
            .rewards
            .iter_mut()
            .find(|r| r.id == reward_id)
            .ok_or(PointsError::RewardNotFound)?;
        if reward.quantity < qty {
            return Err(PointsError::RewardOutOfStock);
        }
        reward.quantity -= qty;
        reward.total_redeemed += qty;
        Ok(())
    }

    async fn create_record(&self, record: &NewRedemptionRecord) -> Result<String> {
        let id = self.next_id("red");
        let mut state = self.inner.state.lock().unwrap();
        state.records.push(RedemptionRecord {
            id: id.clone(),
            user_id: record.user_id.clone(),
            reward_id: record.reward_id.clone(),
            costs: record.costs.clone(),
            status: record.status,
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }
}

impl MemoryBackend {
    /// Number of redemption records, for assertions in tests.
    pub fn record_count(&self) -> usize {
        self.inner.state.lock().unwrap().records.len()
    }

    /// Number of distribution runs ever created, for assertions in tests.
    pub fn distribution_count(&self) -> usize {
        self.inner.state.lock().unwrap().distributions.len()
    }

    /// Snapshot of a distribution run by id, for assertions in tests.
    pub fn distribution(&self, id: &str) -> Option<RewardDistribution> {
        self.inner
            .state
            .lock()
            .unwrap()
            .distributions
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    /// Snapshot of the redemption records, for assertions in tests.
    pub fn records(&self) -> Vec<RedemptionRecord> {
        self.inner.state.lock().unwrap().records.clone()
    }
}
