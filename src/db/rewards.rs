use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::errors::{PointsError, Result};
use crate::models::{DistributionStatus, NewRewardRule, RewardRule};
use crate::stores::RewardStore;

/// Postgres-backed reward rule and distribution store.
pub struct PgRewardStore {
    pool: PgPool,
}

impl PgRewardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: String,
    point_type_id: String,
    min_rank: i64,
    max_rank: i64,
    reward_amount: i64,
    reward_point_type_id: String,
    active: bool,
}

impl From<RuleRow> for RewardRule {
    fn from(row: RuleRow) -> Self {
        RewardRule {
            id: row.id,
            point_type_id: row.point_type_id,
            min_rank: row.min_rank,
            max_rank: row.max_rank,
            reward_amount: row.reward_amount,
            reward_point_type_id: row.reward_point_type_id,
            active: row.active,
        }
    }
}

#[async_trait]
impl RewardStore for PgRewardStore {
    async fn create_rule(&self, rule: &NewRewardRule) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO reward_rules
                (id, point_type_id, min_rank, max_rank, reward_amount,
                 reward_point_type_id, active)
            VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&rule.point_type_id)
        .bind(rule.min_rank)
        .bind(rule.max_rank)
        .bind(rule.reward_amount)
        .bind(&rule.reward_point_type_id)
        .bind(rule.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    async fn list_rules(&self, point_type_id: &str) -> Result<Vec<RewardRule>> {
        debug!(point_type_id = %point_type_id, "loading active reward rules");

        // Declared (insertion) order; rule matching is first-match-wins.
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT id, point_type_id, min_rank, max_rank, reward_amount,
                   reward_point_type_id, active
            FROM reward_rules
            WHERE point_type_id = $1 AND active
            ORDER BY seq ASC
            "#,
        )
        .bind(point_type_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_distribution(&self, snapshot_id: &str, executed_at: i64) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO reward_distributions (id, snapshot_id, executed_at, status)
            VALUES (gen_random_uuid()::text, $1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(snapshot_id)
        .bind(executed_at)
        .bind(DistributionStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    async fn mark_distribution_completed(&self, distribution_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE reward_distributions SET status = $2 WHERE id = $1")
            .bind(distribution_id)
            .bind(DistributionStatus::Completed.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PointsError::InvalidInput(format!(
                "unknown distribution {}",
                distribution_id
            )));
        }
        Ok(())
    }
}
