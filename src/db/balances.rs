use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction as SqlxTransaction};
use tracing::debug;

use crate::errors::Result;
use crate::models::{
    NewTransaction, Transaction, TransactionFilter, TransactionKind, TransactionPage, UserBalance,
};
use crate::stores::{BalanceStore, BalanceTx};

/// Postgres-backed balance store.
///
/// Each [`BalanceTx`] wraps one database transaction; the row-level
/// exclusive lock comes from `SELECT ... FOR UPDATE` and is released on
/// commit or rollback. Different (user, point type) pairs never block
/// each other.
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgBalanceTx {
    tx: SqlxTransaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct BalanceRow {
    user_id: String,
    point_type_id: String,
    balance: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: String,
    user_id: String,
    point_type_id: String,
    amount: i64,
    kind: String,
    reason: String,
    before_balance: i64,
    after_balance: i64,
    created_at: i64,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            user_id: row.user_id,
            point_type_id: row.point_type_id,
            amount: row.amount,
            // The CHECK constraint admits only the two known kinds.
            kind: TransactionKind::from_str(&row.kind).unwrap_or(TransactionKind::Credit),
            reason: row.reason,
            before: row.before_balance,
            after: row.after_balance,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl BalanceTx for PgBalanceTx {
    async fn balance_for_update(
        &mut self,
        user_id: &str,
        point_type_id: &str,
    ) -> Result<UserBalance> {
        // Materialize the row first so FOR UPDATE has something to lock on
        // a pair's very first mutation.
        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, point_type_id, balance, updated_at)
            VALUES ($1, $2, 0, EXTRACT(EPOCH FROM NOW())::bigint)
            ON CONFLICT (user_id, point_type_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(point_type_id)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT user_id, point_type_id, balance, updated_at
            FROM user_balances
            WHERE user_id = $1 AND point_type_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(point_type_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(UserBalance {
            user_id: row.user_id,
            point_type_id: row.point_type_id,
            balance: row.balance,
            updated_at: row.updated_at,
        })
    }

    async fn upsert_balance(&mut self, balance: &UserBalance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, point_type_id, balance, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, point_type_id)
            DO UPDATE SET balance = EXCLUDED.balance, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&balance.user_id)
        .bind(&balance.point_type_id)
        .bind(balance.balance)
        .bind(balance.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_transaction(&mut self, entry: &NewTransaction) -> Result<String> {
        debug!(
            user_id = %entry.user_id,
            point_type_id = %entry.point_type_id,
            kind = entry.kind.as_str(),
            amount = entry.amount,
            "appending ledger entry"
        );

        let row = sqlx::query(
            r#"
            INSERT INTO point_transactions
                (id, user_id, point_type_id, amount, kind, reason,
                 before_balance, after_balance, created_at)
            VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, $6, $7,
                    EXTRACT(EPOCH FROM NOW())::bigint)
            RETURNING id
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.point_type_id)
        .bind(entry.amount)
        .bind(entry.kind.as_str())
        .bind(&entry.reason)
        .bind(entry.before)
        .bind(entry.after)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("id"))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn begin(&self) -> Result<Box<dyn BalanceTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBalanceTx { tx }))
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage> {
        let kind = filter.kind.map(|k| k.as_str().to_string());

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, point_type_id, amount, kind, reason,
                   before_balance, after_balance, created_at
            FROM point_transactions
            WHERE user_id = $1
              AND ($2::text IS NULL OR point_type_id = $2)
              AND ($3::text IS NULL OR kind = $3)
              AND ($4::bigint IS NULL OR created_at >= $4)
              AND ($5::bigint IS NULL OR created_at <= $5)
            ORDER BY created_at DESC, id DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(user_id)
        .bind(&filter.point_type_id)
        .bind(&kind)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        // Same predicate, independent of pagination.
        let total_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM point_transactions
            WHERE user_id = $1
              AND ($2::text IS NULL OR point_type_id = $2)
              AND ($3::text IS NULL OR kind = $3)
              AND ($4::bigint IS NULL OR created_at >= $4)
              AND ($5::bigint IS NULL OR created_at <= $5)
            "#,
        )
        .bind(user_id)
        .bind(&filter.point_type_id)
        .bind(&kind)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(TransactionPage {
            entries: rows.into_iter().map(Into::into).collect(),
            total: total_row.get("total"),
        })
    }

    async fn get_balance(&self, user_id: &str, point_type_id: &str) -> Result<UserBalance> {
        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT user_id, point_type_id, balance, updated_at
            FROM user_balances
            WHERE user_id = $1 AND point_type_id = $2
            "#,
        )
        .bind(user_id)
        .bind(point_type_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => UserBalance {
                user_id: r.user_id,
                point_type_id: r.point_type_id,
                balance: r.balance,
                updated_at: r.updated_at,
            },
            None => UserBalance::zero(user_id, point_type_id),
        })
    }
}
