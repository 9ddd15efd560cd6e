//! Store contracts consumed by the engines.
//!
//! Declared at the consumer side so implementations can live in outer
//! layers: Postgres in `crate::db`, Redis in `crate::ranking`, and the
//! in-process variants in [`memory`]. Engines take these as constructor
//! arguments; there is no process-wide registry.

pub mod memory;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::errors::Result;
use crate::models::{
    NewRedemptionRecord, NewRedemptionReward, NewRewardRule, NewTransaction, PointType,
    RedemptionReward, RewardRule, TransactionFilter, TransactionPage, UserBalance,
};

/// Reference data for point types.
///
/// Gets return tombstoned (soft-deleted) rows; the registry applies the
/// soft-delete filter so it can still distinguish "already deleted".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PointTypeStore: Send + Sync {
    async fn create(&self, pt: &PointType) -> Result<String>;
    async fn update(&self, pt: &PointType) -> Result<()>;
    async fn soft_delete(&self, name: &str, deleted_at: i64) -> Result<()>;
    async fn get_by_id(&self, id: &str) -> Result<Option<PointType>>;
    async fn get_by_name(&self, name: &str) -> Result<Option<PointType>>;
    /// Live (non-deleted) types, creation time descending.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<PointType>>;
    async fn has_balances(&self, point_type_id: &str) -> Result<bool>;
}

/// The ledger's single mandatory transactional boundary.
///
/// `balance_for_update` must hold an exclusive row-level lock on the
/// (user, point type) pair until commit or rollback, creating the row at
/// zero if absent. Dropping the transaction without committing rolls it
/// back.
#[async_trait]
pub trait BalanceTx: Send {
    async fn balance_for_update(
        &mut self,
        user_id: &str,
        point_type_id: &str,
    ) -> Result<UserBalance>;
    async fn upsert_balance(&mut self, balance: &UserBalance) -> Result<()>;
    async fn insert_transaction(&mut self, entry: &NewTransaction) -> Result<String>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Owns `UserBalance` and the append-only transaction history.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BalanceTx>>;
    async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage>;
    /// Read a balance outside any transaction; zero if absent.
    async fn get_balance(&self, user_id: &str, point_type_id: &str) -> Result<UserBalance>;
}

/// Derived, non-authoritative ordered view of balances per point type.
/// Rebuildable from the ledger; writes are best-effort.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Last write wins; idempotent.
    async fn update_score(&self, point_type_id: &str, user_id: &str, score: i64) -> Result<()>;
    /// User ids ordered by descending score for the inclusive 0-based
    /// rank-offset range `[start, stop]`. Tie order is stable across
    /// repeated calls absent further writes.
    async fn get_top(&self, point_type_id: &str, start: i64, stop: i64) -> Result<Vec<String>>;
}

/// Reward rules and distribution run records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn create_rule(&self, rule: &NewRewardRule) -> Result<String>;
    /// Active rules for the pool, in declared order (first match wins).
    async fn list_rules(&self, point_type_id: &str) -> Result<Vec<RewardRule>>;
    /// Creates a run in pending status and returns its id.
    async fn create_distribution(&self, snapshot_id: &str, executed_at: i64) -> Result<String>;
    async fn mark_distribution_completed(&self, distribution_id: &str) -> Result<()>;
}

/// Redemption catalog, inventory, and records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn create_reward(&self, reward: &NewRedemptionReward) -> Result<String>;
    async fn get_reward(&self, reward_id: &str) -> Result<Option<RedemptionReward>>;
    /// Guarded decrement: fails with `RewardOutOfStock` when the stored
    /// quantity is below `qty` at decrement time.
    async fn decrement_inventory(&self, reward_id: &str, qty: i64) -> Result<()>;
    async fn create_record(&self, record: &NewRedemptionRecord) -> Result<String>;
}
