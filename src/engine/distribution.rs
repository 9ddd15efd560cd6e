use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::engine::ledger::BalanceLedger;
use crate::errors::{PointsError, Result};
use crate::models::NewRewardRule;
use crate::stores::{RankingStore, RewardStore};

const RANK_REWARD_REASON: &str = "rank reward";
const DEFAULT_TOP_LIMIT: i64 = 100;

/// Batch job crediting rank-based rewards against the current ranking.
///
/// Concurrent runs for the same point type are not mutually exclusive and
/// may double-pay; scheduling discipline lives with the caller.
pub struct DistributionEngine {
    rewards: Arc<dyn RewardStore>,
    ranking: Arc<dyn RankingStore>,
    ledger: Arc<BalanceLedger>,
}

impl DistributionEngine {
    pub fn new(
        rewards: Arc<dyn RewardStore>,
        ranking: Arc<dyn RankingStore>,
        ledger: Arc<BalanceLedger>,
    ) -> Self {
        Self {
            rewards,
            ranking,
            ledger,
        }
    }

    /// Register a reward rule for a point type's ranking pool.
    pub async fn create_rule(&self, rule: NewRewardRule) -> Result<String> {
        if rule.min_rank < 1 || rule.max_rank < rule.min_rank {
            return Err(PointsError::InvalidInput(format!(
                "invalid rank range [{}, {}]",
                rule.min_rank, rule.max_rank
            )));
        }
        if rule.reward_amount <= 0 {
            return Err(PointsError::InvalidInput(
                "reward amount must be positive".to_string(),
            ));
        }
        self.rewards.create_rule(&rule).await
    }

    /// Read-only top-of-ranking query for a point type.
    pub async fn top(&self, point_type_id: &str, limit: i64, offset: i64) -> Result<Vec<String>> {
        let limit = if limit <= 0 { DEFAULT_TOP_LIMIT } else { limit };
        let start = offset.max(0);
        self.ranking
            .get_top(point_type_id, start, start + limit - 1)
            .await
    }

    /// Run a distribution over the current top `top_n` of the pool.
    ///
    /// Returns the distribution id, or `None` when the pool has no active
    /// rules (success with no effect). Each ranked position is matched
    /// against the first rule whose range contains it; positions with no
    /// matching rule receive nothing. Every credit is an independent
    /// ledger transaction — one user's failure is logged and does not
    /// roll back another's, and the run still completes.
    ///
    /// `top_n` must be positive; callers validate or default it.
    #[tracing::instrument(skip(self), fields(point_type_id = %point_type_id, top_n))]
    pub async fn execute(&self, point_type_id: &str, top_n: i64) -> Result<Option<String>> {
        let rules = self.rewards.list_rules(point_type_id).await?;
        if rules.is_empty() {
            info!("no active reward rules; nothing to distribute");
            return Ok(None);
        }

        let users = self.ranking.get_top(point_type_id, 0, top_n - 1).await?;

        let executed_at = Utc::now().timestamp();
        let snapshot_id = executed_at.to_string();
        let distribution_id = self
            .rewards
            .create_distribution(&snapshot_id, executed_at)
            .await?;

        for (index, user_id) in users.iter().enumerate() {
            let rank = index as i64 + 1;
            // First match by declared rule order, not narrowest range.
            let Some(rule) = rules
                .iter()
                .find(|r| rank >= r.min_rank && rank <= r.max_rank)
            else {
                continue;
            };

            if let Err(e) = self
                .ledger
                .credit(
                    user_id,
                    &rule.reward_point_type_id,
                    rule.reward_amount,
                    RANK_REWARD_REASON,
                )
                .await
            {
                warn!(
                    user_id = %user_id,
                    rank,
                    rule_id = %rule.id,
                    error = %e,
                    "rank reward credit failed; continuing with remaining ranks"
                );
            }
        }

        self.rewards
            .mark_distribution_completed(&distribution_id)
            .await?;

        info!(
            distribution_id = %distribution_id,
            ranked_users = users.len(),
            "distribution completed"
        );
        Ok(Some(distribution_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DistributionStatus;
    use crate::stores::memory::MemoryBackend;

    async fn setup() -> (DistributionEngine, Arc<BalanceLedger>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let ledger = Arc::new(BalanceLedger::new(backend.clone(), backend.clone()));
        let engine = DistributionEngine::new(backend.clone(), backend.clone(), ledger.clone());
        (engine, ledger, backend)
    }

    fn rule(min: i64, max: i64, amount: i64) -> NewRewardRule {
        NewRewardRule {
            point_type_id: "gold".to_string(),
            min_rank: min,
            max_rank: max,
            reward_amount: amount,
            reward_point_type_id: "gems".to_string(),
            active: true,
        }
    }

    async fn seed_ranking(ledger: &BalanceLedger) {
        // Descending gold balances: A > B > C > D.
        ledger.credit("A", "gold", 400, "seed").await.unwrap();
        ledger.credit("B", "gold", 300, "seed").await.unwrap();
        ledger.credit("C", "gold", 200, "seed").await.unwrap();
        ledger.credit("D", "gold", 100, "seed").await.unwrap();
    }

    #[tokio::test]
    async fn rank_rewards_follow_rule_ranges() {
        let (engine, ledger, backend) = setup().await;
        seed_ranking(&ledger).await;
        engine.create_rule(rule(1, 1, 100)).await.unwrap();
        engine.create_rule(rule(2, 3, 50)).await.unwrap();

        let distribution_id = engine.execute("gold", 10).await.unwrap().unwrap();

        assert_eq!(ledger.balance("A", "gems").await.unwrap().balance, 100);
        assert_eq!(ledger.balance("B", "gems").await.unwrap().balance, 50);
        assert_eq!(ledger.balance("C", "gems").await.unwrap().balance, 50);
        assert_eq!(ledger.balance("D", "gems").await.unwrap().balance, 0);

        let dist = backend.distribution(&distribution_id).unwrap();
        assert_eq!(dist.status, DistributionStatus::Completed);

        // Each credit is its own ledger entry with the fixed reason.
        for user in ["A", "B", "C"] {
            let page = ledger
                .list_transactions(user, Default::default())
                .await
                .unwrap();
            let reward_entries: Vec<_> = page
                .entries
                .iter()
                .filter(|e| e.reason == RANK_REWARD_REASON)
                .collect();
            assert_eq!(reward_entries.len(), 1);
        }
    }

    #[tokio::test]
    async fn overlapping_rules_resolve_first_match_by_declared_order() {
        let (engine, ledger, _) = setup().await;
        seed_ranking(&ledger).await;
        // Both rules cover rank 1; the earlier declaration wins even
        // though the later one pays more.
        engine.create_rule(rule(1, 3, 10)).await.unwrap();
        engine.create_rule(rule(1, 1, 999)).await.unwrap();

        engine.execute("gold", 3).await.unwrap().unwrap();

        assert_eq!(ledger.balance("A", "gems").await.unwrap().balance, 10);
    }

    #[tokio::test]
    async fn no_rules_means_success_with_no_effect() {
        let (engine, ledger, backend) = setup().await;
        seed_ranking(&ledger).await;

        let result = engine.execute("gold", 10).await.unwrap();
        assert!(result.is_none());
        assert_eq!(backend.distribution_count(), 0);
        assert_eq!(ledger.balance("A", "gems").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn top_n_caps_the_paid_ranks() {
        let (engine, ledger, _) = setup().await;
        seed_ranking(&ledger).await;
        engine.create_rule(rule(1, 10, 5)).await.unwrap();

        engine.execute("gold", 2).await.unwrap().unwrap();

        assert_eq!(ledger.balance("A", "gems").await.unwrap().balance, 5);
        assert_eq!(ledger.balance("B", "gems").await.unwrap().balance, 5);
        assert_eq!(ledger.balance("C", "gems").await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn create_rule_validates_range_and_amount() {
        let (engine, _, _) = setup().await;
        assert!(matches!(
            engine.create_rule(rule(0, 3, 10)).await.unwrap_err(),
            PointsError::InvalidInput(_)
        ));
        assert!(matches!(
            engine.create_rule(rule(3, 2, 10)).await.unwrap_err(),
            PointsError::InvalidInput(_)
        ));
        assert!(matches!(
            engine.create_rule(rule(1, 2, 0)).await.unwrap_err(),
            PointsError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn top_defaults_non_positive_limit() {
        let (engine, ledger, _) = setup().await;
        seed_ranking(&ledger).await;

        let top = engine.top("gold", 0, 0).await.unwrap();
        assert_eq!(top.len(), 4);
        assert_eq!(top[0], "A");

        let offset_page = engine.top("gold", 2, 1).await.unwrap();
        assert_eq!(offset_page, vec!["B".to_string(), "C".to_string()]);
    }
}
