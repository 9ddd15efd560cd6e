use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::errors::{PointsError, Result};
use crate::models::PointType;
use crate::stores::PointTypeStore;

/// Postgres-backed point type store.
pub struct PgPointTypeStore {
    pool: PgPool,
}

impl PgPointTypeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PointTypeRow {
    id: String,
    name: String,
    display_name: String,
    description: String,
    enabled: bool,
    deleted_at: Option<i64>,
    created_at: i64,
}

impl From<PointTypeRow> for PointType {
    fn from(row: PointTypeRow) -> Self {
        PointType {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            description: row.description,
            enabled: row.enabled,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PointTypeStore for PgPointTypeStore {
    async fn create(&self, pt: &PointType) -> Result<String> {
        debug!(name = %pt.name, "creating point type");

        let row = sqlx::query(
            r#"
            INSERT INTO point_types (id, name, display_name, description, enabled, created_at)
            VALUES (gen_random_uuid()::text, $1, $2, $3, $4, EXTRACT(EPOCH FROM NOW())::bigint)
            RETURNING id
            "#,
        )
        .bind(&pt.name)
        .bind(&pt.display_name)
        .bind(&pt.description)
        .bind(pt.enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(PointsError::Storage)
        .map_err(|e| {
            if e.is_unique_violation() {
                PointsError::DuplicatePointTypeName
            } else {
                e
            }
        })?;

        Ok(row.get("id"))
    }

    async fn update(&self, pt: &PointType) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE point_types
            SET display_name = $2, description = $3, enabled = $4
            WHERE id = $1
            "#,
        )
        .bind(&pt.id)
        .bind(&pt.display_name)
        .bind(&pt.description)
        .bind(pt.enabled)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PointsError::PointTypeNotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, name: &str, deleted_at: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE point_types
            SET deleted_at = $2
            WHERE name = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(name)
        .bind(deleted_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PointsError::PointTypeNotFound);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PointType>> {
        let row = sqlx::query_as::<_, PointTypeRow>(
            r#"
            SELECT id, name, display_name, description, enabled, deleted_at, created_at
            FROM point_types
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<PointType>> {
        let row = sqlx::query_as::<_, PointTypeRow>(
            r#"
            SELECT id, name, display_name, description, enabled, deleted_at, created_at
            FROM point_types
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<PointType>> {
        let rows = sqlx::query_as::<_, PointTypeRow>(
            r#"
            SELECT id, name, display_name, description, enabled, deleted_at, created_at
            FROM point_types
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn has_balances(&self, point_type_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM user_balances WHERE point_type_id = $1) AS in_use",
        )
        .bind(point_type_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("in_use"))
    }
}
