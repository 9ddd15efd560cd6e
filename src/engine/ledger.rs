use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::{PointsError, Result};
use crate::models::{
    NewTransaction, TransactionFilter, TransactionKind, TransactionPage, UserBalance,
};
use crate::stores::{BalanceStore, BalanceTx, RankingStore};

const DEFAULT_PAGE_SIZE: i64 = 50;

/// The authoritative balance ledger.
///
/// Every mutation to a (user, point type) pair runs as one atomic unit:
/// exclusive row access, read-modify-write of the balance, append of the
/// ledger entry, commit. After a successful commit the ranking index is
/// updated best-effort; its failure is logged and swallowed — the ledger
/// is authoritative, the index is a derived cache that may lag.
pub struct BalanceLedger {
    store: Arc<dyn BalanceStore>,
    ranking: Arc<dyn RankingStore>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn BalanceStore>, ranking: Arc<dyn RankingStore>) -> Self {
        Self { store, ranking }
    }

    /// Credit `amount` points to the user.
    ///
    /// `amount <= 0` is a defensive clamp: the call succeeds with no
    /// effect rather than erroring.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, point_type_id = %point_type_id))]
    pub async fn credit(
        &self,
        user_id: &str,
        point_type_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<()> {
        if amount <= 0 {
            return Ok(());
        }
        self.apply(user_id, point_type_id, amount, TransactionKind::Credit, reason)
            .await
    }

    /// Debit `amount` points from the user.
    ///
    /// Fails with `InsufficientBalance`, leaving state unchanged, when the
    /// current balance is below `amount`. `amount <= 0` is a no-op.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, point_type_id = %point_type_id))]
    pub async fn debit(
        &self,
        user_id: &str,
        point_type_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<()> {
        if amount <= 0 {
            return Ok(());
        }
        self.apply(user_id, point_type_id, amount, TransactionKind::Debit, reason)
            .await
    }

    async fn apply(
        &self,
        user_id: &str,
        point_type_id: &str,
        amount: i64,
        kind: TransactionKind,
        reason: &str,
    ) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let after = match self
            .mutate_locked(tx.as_mut(), user_id, point_type_id, amount, kind, reason)
            .await
        {
            Ok(after) => after,
            Err(e) => {
                // Best effort; the uncommitted unit is discarded either way.
                let _ = tx.rollback().await;
                return Err(e);
            }
        };

        tx.commit().await?;

        info!(
            user_id = %user_id,
            point_type_id = %point_type_id,
            kind = kind.as_str(),
            amount,
            after,
            "ledger entry committed"
        );

        // The index write sits outside the atomic unit and must never
        // fail a committed mutation.
        if let Err(e) = self
            .ranking
            .update_score(point_type_id, user_id, after)
            .await
        {
            warn!(
                user_id = %user_id,
                point_type_id = %point_type_id,
                error = %e,
                "ranking index update failed; index may lag the ledger"
            );
        }

        Ok(())
    }

    async fn mutate_locked(
        &self,
        tx: &mut dyn BalanceTx,
        user_id: &str,
        point_type_id: &str,
        amount: i64,
        kind: TransactionKind,
        reason: &str,
    ) -> Result<i64> {
        let current = tx.balance_for_update(user_id, point_type_id).await?;
        let before = current.balance;

        let after = match kind {
            TransactionKind::Credit => before + amount,
            TransactionKind::Debit => {
                if before < amount {
                    return Err(PointsError::InsufficientBalance);
                }
                before - amount
            }
        };

        tx.upsert_balance(&UserBalance {
            user_id: user_id.to_string(),
            point_type_id: point_type_id.to_string(),
            balance: after,
            updated_at: Utc::now().timestamp(),
        })
        .await?;

        tx.insert_transaction(&NewTransaction {
            user_id: user_id.to_string(),
            point_type_id: point_type_id.to_string(),
            amount,
            kind,
            reason: reason.to_string(),
            before,
            after,
        })
        .await?;

        Ok(after)
    }

    /// Current balance for a pair; zero if the pair has no row.
    pub async fn balance(&self, user_id: &str, point_type_id: &str) -> Result<UserBalance> {
        self.store.get_balance(user_id, point_type_id).await
    }

    /// Page of the user's transactions, newest first, plus the total count
    /// matching the filter independent of pagination.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        mut filter: TransactionFilter,
    ) -> Result<TransactionPage> {
        if filter.limit <= 0 {
            filter.limit = DEFAULT_PAGE_SIZE;
        }
        if filter.offset < 0 {
            filter.offset = 0;
        }
        self.store.list_transactions(user_id, &filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryBackend;
    use crate::stores::MockRankingStore;
    use futures::future::join_all;

    fn ledger() -> (BalanceLedger, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (
            BalanceLedger::new(backend.clone(), backend.clone()),
            backend,
        )
    }

    #[tokio::test]
    async fn credit_creates_balance_and_entry() {
        let (ledger, _) = ledger();
        ledger.credit("u1", "gold", 100, "signup bonus").await.unwrap();

        let balance = ledger.balance("u1", "gold").await.unwrap();
        assert_eq!(balance.balance, 100);

        let page = ledger
            .list_transactions("u1", TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        let entry = &page.entries[0];
        assert_eq!(entry.kind, TransactionKind::Credit);
        assert_eq!(entry.amount, 100);
        assert_eq!(entry.before, 0);
        assert_eq!(entry.after, 100);
        assert_eq!(entry.reason, "signup bonus");
    }

    #[tokio::test]
    async fn balance_tracks_sum_of_signed_amounts() {
        let (ledger, _) = ledger();
        ledger.credit("u1", "gold", 100, "a").await.unwrap();
        ledger.debit("u1", "gold", 30, "b").await.unwrap();
        ledger.credit("u1", "gold", 5, "c").await.unwrap();

        let balance = ledger.balance("u1", "gold").await.unwrap();
        assert_eq!(balance.balance, 75);

        // Balance equals the `after` of the most recent entry.
        let page = ledger
            .list_transactions("u1", TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.entries[0].after, 75);
    }

    #[tokio::test]
    async fn debit_beyond_balance_fails_and_changes_nothing() {
        let (ledger, _) = ledger();
        ledger.credit("u1", "gold", 50, "seed").await.unwrap();

        let err = ledger.debit("u1", "gold", 51, "too much").await.unwrap_err();
        assert!(matches!(err, PointsError::InsufficientBalance));

        let balance = ledger.balance("u1", "gold").await.unwrap();
        assert_eq!(balance.balance, 50);
        let page = ledger
            .list_transactions("u1", TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_clamped_to_noops() {
        let (ledger, _) = ledger();
        ledger.credit("u1", "gold", 0, "noop").await.unwrap();
        ledger.credit("u1", "gold", -5, "noop").await.unwrap();
        ledger.debit("u1", "gold", -1, "noop").await.unwrap();

        let page = ledger
            .list_transactions("u1", TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn concurrent_credits_lose_no_updates() {
        let (ledger, _) = ledger();
        let ledger = Arc::new(ledger);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.credit("u1", "gold", 7, "burst").await })
            })
            .collect();
        for result in join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 20 * 7);
        let page = ledger
            .list_transactions(
                "u1",
                TransactionFilter {
                    limit: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 20);
    }

    #[tokio::test]
    async fn list_total_is_independent_of_pagination() {
        let (ledger, _) = ledger();
        for i in 0..5 {
            ledger.credit("u1", "gold", i + 1, "seed").await.unwrap();
        }
        ledger.credit("u1", "silver", 1, "other pool").await.unwrap();
        ledger.debit("u1", "gold", 2, "spend").await.unwrap();

        let page = ledger
            .list_transactions(
                "u1",
                TransactionFilter {
                    point_type_id: Some("gold".to_string()),
                    kind: Some(TransactionKind::Credit),
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn ledger_commit_updates_ranking_index() {
        let (ledger, backend) = ledger();
        ledger.credit("u1", "gold", 40, "seed").await.unwrap();
        ledger.credit("u2", "gold", 90, "seed").await.unwrap();

        let top = RankingStore::get_top(backend.as_ref(), "gold", 0, 9)
            .await
            .unwrap();
        assert_eq!(top, vec!["u2".to_string(), "u1".to_string()]);
    }

    #[tokio::test]
    async fn ranking_failure_is_swallowed() {
        let backend = Arc::new(MemoryBackend::new());
        let mut ranking = MockRankingStore::new();
        ranking.expect_update_score().returning(|_, _, _| {
            Err(PointsError::InvalidInput("index down".to_string()))
        });
        let ledger = BalanceLedger::new(backend.clone(), Arc::new(ranking));

        // The committed mutation must not surface the index failure.
        ledger.credit("u1", "gold", 10, "seed").await.unwrap();
        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 10);
    }
}
