use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::errors::{PointsError, Result};
use crate::models::{NewRedemptionRecord, NewRedemptionReward, RedemptionReward};
use crate::stores::RedemptionStore;

/// Postgres-backed redemption catalog store.
///
/// The cost vector persists as JSONB and round-trips through serde_json.
pub struct PgRedemptionStore {
    pool: PgPool,
}

impl PgRedemptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RewardRow {
    id: String,
    name: String,
    description: String,
    costs: serde_json::Value,
    quantity: i64,
    enabled: bool,
    total_redeemed: i64,
    created_at: i64,
}

#[async_trait]
impl RedemptionStore for PgRedemptionStore {
    async fn create_reward(&self, reward: &NewRedemptionReward) -> Result<String> {
        let costs = serde_json::to_value(&reward.costs)?;

        let row = sqlx::query(
            r#"
            INSERT INTO redemption_rewards
                (id, name, description, costs, quantity, enabled, total_redeemed, created_at)
            VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, 0,
                    EXTRACT(EPOCH FROM NOW())::bigint)
            RETURNING id
            "#,
        )
        .bind(&reward.name)
        .bind(&reward.description)
        .bind(&costs)
        .bind(reward.quantity)
        .bind(reward.enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    async fn get_reward(&self, reward_id: &str) -> Result<Option<RedemptionReward>> {
        let row = sqlx::query_as::<_, RewardRow>(
            r#"
            SELECT id, name, description, costs, quantity, enabled,
                   total_redeemed, created_at
            FROM redemption_rewards
            WHERE id = $1
            "#,
        )
        .bind(reward_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let costs: HashMap<String, i64> = serde_json::from_value(r.costs)?;
                Ok(Some(RedemptionReward {
                    id: r.id,
                    name: r.name,
                    description: r.description,
                    costs,
                    quantity: r.quantity,
                    enabled: r.enabled,
                    total_redeemed: r.total_redeemed,
                    created_at: r.created_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn decrement_inventory(&self, reward_id: &str, qty: i64) -> Result<()> {
        debug!(reward_id = %reward_id, qty, "decrementing reward inventory");

        // Guard against the current stored quantity; a concurrent
        // redemption may have consumed stock since the reward was read.
        let result = sqlx::query(
            r#"
            UPDATE redemption_rewards
            SET quantity = quantity - $2, total_redeemed = total_redeemed + $2
            WHERE id = $1 AND quantity >= $2
            "#,
        )
        .bind(reward_id)
        .bind(qty)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PointsError::RewardOutOfStock);
        }
        Ok(())
    }

    async fn create_record(&self, record: &NewRedemptionRecord) -> Result<String> {
        let costs = serde_json::to_value(&record.costs)?;

        let row = sqlx::query(
            r#"
            INSERT INTO redemption_records (id, user_id, reward_id, costs, status, created_at)
            VALUES (gen_random_uuid()::text, $1, $2, $3, $4,
                    EXTRACT(EPOCH FROM NOW())::bigint)
            RETURNING id
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.reward_id)
        .bind(&costs)
        .bind(record.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }
}
