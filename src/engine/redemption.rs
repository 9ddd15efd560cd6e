use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::{PointsError, Result};
use crate::models::{
    NewRedemptionRecord, NewRedemptionReward, NewTransaction, RedemptionStatus, TransactionKind,
    UserBalance,
};
use crate::stores::{BalanceStore, BalanceTx, RedemptionStore};

const REDEMPTION_REASON: &str = "redemption";

/// Redeems accumulated points for catalog rewards.
///
/// The multi-currency debit runs in one balance-store transaction. The
/// inventory decrement and the redemption record live in a separate
/// store and are not transactionally coupled to the debits: a crash
/// between the steps can leave a partial outcome. Known gap, see
/// DESIGN.md.
pub struct RedemptionEngine {
    rewards: Arc<dyn RedemptionStore>,
    balances: Arc<dyn BalanceStore>,
}

impl RedemptionEngine {
    pub fn new(rewards: Arc<dyn RedemptionStore>, balances: Arc<dyn BalanceStore>) -> Self {
        Self { rewards, balances }
    }

    /// Add a reward to the catalog.
    pub async fn create_reward(&self, reward: NewRedemptionReward) -> Result<String> {
        if reward.name.trim().is_empty() {
            return Err(PointsError::InvalidInput("name cannot be empty".into()));
        }
        if reward.quantity < 0 {
            return Err(PointsError::InvalidInput(
                "quantity cannot be negative".to_string(),
            ));
        }
        if reward.costs.values().any(|&cost| cost <= 0) {
            return Err(PointsError::InvalidInput(
                "cost amounts must be positive".to_string(),
            ));
        }
        self.rewards.create_reward(&reward).await
    }

    /// Redeem a reward for a user and return the redemption record id.
    ///
    /// Sufficiency of every required balance is verified before any
    /// currency is charged; a single short balance fails the whole
    /// redemption with no partial charge. The inventory guard runs
    /// against the stored quantity at decrement time — an out-of-stock
    /// result rolls the debits back.
    #[tracing::instrument(skip(self), fields(user_id = %user_id, reward_id = %reward_id))]
    pub async fn redeem(&self, user_id: &str, reward_id: &str) -> Result<String> {
        let reward = self
            .rewards
            .get_reward(reward_id)
            .await?
            .ok_or(PointsError::RewardNotFound)?;

        if !reward.enabled {
            return Err(PointsError::UnauthorizedOperation);
        }

        // Stable charge order keeps lock acquisition deterministic.
        let mut costs: Vec<(String, i64)> = reward
            .costs
            .iter()
            .map(|(pt, &cost)| (pt.clone(), cost))
            .collect();
        costs.sort();

        if costs.is_empty() {
            // Free reward: no balance transaction at all.
            self.rewards.decrement_inventory(reward_id, 1).await?;
        } else {
            let mut tx = self.balances.begin().await?;
            match self.charge(tx.as_mut(), user_id, &costs).await {
                Ok(()) => {}
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }

            // Separate store, separate failure domain: a failed decrement
            // still aborts the uncommitted debits, but a success here
            // followed by a commit failure leaves stock consumed with no
            // charge.
            if let Err(e) = self.rewards.decrement_inventory(reward_id, 1).await {
                let _ = tx.rollback().await;
                return Err(e);
            }

            tx.commit().await?;
        }

        let record_id = self
            .rewards
            .create_record(&NewRedemptionRecord {
                user_id: user_id.to_string(),
                reward_id: reward_id.to_string(),
                costs: reward.costs.clone(),
                status: RedemptionStatus::Completed,
            })
            .await
            .map_err(|e| {
                warn!(
                    user_id = %user_id,
                    reward_id = %reward_id,
                    error = %e,
                    "redemption charged but record creation failed"
                );
                e
            })?;

        info!(
            user_id = %user_id,
            reward_id = %reward_id,
            record_id = %record_id,
            currencies = costs.len(),
            "redemption completed"
        );
        Ok(record_id)
    }

    async fn charge(
        &self,
        tx: &mut dyn BalanceTx,
        user_id: &str,
        costs: &[(String, i64)],
    ) -> Result<()> {
        // Read-only sufficiency pass over every currency first; no partial
        // charge is applied if any single one is short.
        for (point_type_id, cost) in costs {
            let current = tx.balance_for_update(user_id, point_type_id).await?;
            if current.balance < *cost {
                return Err(PointsError::InsufficientBalance);
            }
        }

        for (point_type_id, cost) in costs {
            let current = tx.balance_for_update(user_id, point_type_id).await?;
            let before = current.balance;
            let after = before - cost;

            tx.upsert_balance(&UserBalance {
                user_id: user_id.to_string(),
                point_type_id: point_type_id.clone(),
                balance: after,
                updated_at: Utc::now().timestamp(),
            })
            .await?;

            tx.insert_transaction(&NewTransaction {
                user_id: user_id.to_string(),
                point_type_id: point_type_id.clone(),
                amount: *cost,
                kind: TransactionKind::Debit,
                reason: REDEMPTION_REASON.to_string(),
                before,
                after,
            })
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::engine::ledger::BalanceLedger;
    use crate::models::TransactionFilter;
    use crate::stores::memory::MemoryBackend;

    async fn setup() -> (RedemptionEngine, Arc<BalanceLedger>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let ledger = Arc::new(BalanceLedger::new(backend.clone(), backend.clone()));
        let engine = RedemptionEngine::new(backend.clone(), backend.clone());
        (engine, ledger, backend)
    }

    fn reward(costs: &[(&str, i64)], quantity: i64, enabled: bool) -> NewRedemptionReward {
        NewRedemptionReward {
            name: "badge".to_string(),
            description: "shiny badge".to_string(),
            costs: costs
                .iter()
                .map(|(pt, amount)| (pt.to_string(), *amount))
                .collect::<HashMap<_, _>>(),
            quantity,
            enabled,
        }
    }

    #[tokio::test]
    async fn exact_balance_redeems_to_zero() {
        let (engine, ledger, backend) = setup().await;
        ledger.credit("u1", "gold", 50, "seed").await.unwrap();
        let reward_id = engine
            .create_reward(reward(&[("gold", 50)], 3, true))
            .await
            .unwrap();

        let record_id = engine.redeem("u1", &reward_id).await.unwrap();

        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 0);
        let stored = backend.get_reward(&reward_id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 2);
        assert_eq!(stored.total_redeemed, 1);

        let records = backend.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record_id);
        assert_eq!(records[0].status, RedemptionStatus::Completed);
        assert_eq!(records[0].costs.get("gold"), Some(&50));
    }

    #[tokio::test]
    async fn one_point_short_changes_nothing() {
        let (engine, ledger, backend) = setup().await;
        ledger.credit("u1", "gold", 49, "seed").await.unwrap();
        let reward_id = engine
            .create_reward(reward(&[("gold", 50)], 3, true))
            .await
            .unwrap();

        let err = engine.redeem("u1", &reward_id).await.unwrap_err();
        assert!(matches!(err, PointsError::InsufficientBalance));

        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 49);
        let stored = backend.get_reward(&reward_id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 3);
        assert_eq!(backend.record_count(), 0);
    }

    #[tokio::test]
    async fn any_short_currency_blocks_the_whole_charge() {
        let (engine, ledger, _) = setup().await;
        ledger.credit("u1", "gold", 100, "seed").await.unwrap();
        ledger.credit("u1", "silver", 5, "seed").await.unwrap();
        let reward_id = engine
            .create_reward(reward(&[("gold", 50), ("silver", 10)], 1, true))
            .await
            .unwrap();

        let err = engine.redeem("u1", &reward_id).await.unwrap_err();
        assert!(matches!(err, PointsError::InsufficientBalance));

        // The sufficient currency was not partially charged.
        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 100);
        assert_eq!(ledger.balance("u1", "silver").await.unwrap().balance, 5);
    }

    #[tokio::test]
    async fn multi_currency_redemption_debits_each_pool_once() {
        let (engine, ledger, backend) = setup().await;
        ledger.credit("u1", "gold", 100, "seed").await.unwrap();
        ledger.credit("u1", "silver", 20, "seed").await.unwrap();
        let reward_id = engine
            .create_reward(reward(&[("gold", 50), ("silver", 10)], 1, true))
            .await
            .unwrap();

        engine.redeem("u1", &reward_id).await.unwrap();

        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 50);
        assert_eq!(ledger.balance("u1", "silver").await.unwrap().balance, 10);

        let page = ledger
            .list_transactions(
                "u1",
                TransactionFilter {
                    kind: Some(TransactionKind::Debit),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.entries.iter().all(|e| e.reason == REDEMPTION_REASON));
        assert_eq!(backend.record_count(), 1);
    }

    #[tokio::test]
    async fn out_of_stock_fails_before_any_debit_sticks() {
        let (engine, ledger, backend) = setup().await;
        ledger.credit("u1", "gold", 100, "seed").await.unwrap();
        let reward_id = engine
            .create_reward(reward(&[("gold", 50)], 0, true))
            .await
            .unwrap();

        let err = engine.redeem("u1", &reward_id).await.unwrap_err();
        assert!(matches!(err, PointsError::RewardOutOfStock));

        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 100);
        assert_eq!(backend.record_count(), 0);
    }

    #[tokio::test]
    async fn disabled_reward_is_unauthorized() {
        let (engine, ledger, _) = setup().await;
        ledger.credit("u1", "gold", 100, "seed").await.unwrap();
        let reward_id = engine
            .create_reward(reward(&[("gold", 50)], 3, false))
            .await
            .unwrap();

        let err = engine.redeem("u1", &reward_id).await.unwrap_err();
        assert!(matches!(err, PointsError::UnauthorizedOperation));
        assert_eq!(ledger.balance("u1", "gold").await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn unknown_reward_is_not_found() {
        let (engine, _, _) = setup().await;
        let err = engine.redeem("u1", "missing").await.unwrap_err();
        assert!(matches!(err, PointsError::RewardNotFound));
    }

    #[tokio::test]
    async fn free_reward_skips_the_balance_transaction() {
        let (engine, ledger, backend) = setup().await;
        let reward_id = engine.create_reward(reward(&[], 2, true)).await.unwrap();

        engine.redeem("u1", &reward_id).await.unwrap();

        let stored = backend.get_reward(&reward_id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 1);
        assert_eq!(backend.record_count(), 1);
        let page = ledger
            .list_transactions("u1", Default::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn create_reward_validates_inputs() {
        let (engine, _, _) = setup().await;
        assert!(matches!(
            engine
                .create_reward(NewRedemptionReward {
                    name: " ".to_string(),
                    description: String::new(),
                    costs: HashMap::new(),
                    quantity: 1,
                    enabled: true,
                })
                .await
                .unwrap_err(),
            PointsError::InvalidInput(_)
        ));
        assert!(matches!(
            engine
                .create_reward(reward(&[("gold", 0)], 1, true))
                .await
                .unwrap_err(),
            PointsError::InvalidInput(_)
        ));
        assert!(matches!(
            engine
                .create_reward(reward(&[("gold", 5)], -1, true))
                .await
                .unwrap_err(),
            PointsError::InvalidInput(_)
        ));
    }
}
