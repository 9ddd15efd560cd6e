//! Redis RankingStore implementation.
//!
//! One sorted set per point type holds user id -> current balance.
//! Key format: `{prefix}:ranking:{point_type_id}`.
//!
//! The set is a derived index: writes come from the ledger after commit
//! and are best-effort, so a member may transiently lag the committed
//! balance until the next successful write for that user.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{debug, info};

use crate::errors::Result;
use crate::stores::RankingStore;

pub struct RedisRankingStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisRankingStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `key_prefix` - Prefix for all keys (default: "points")
    pub async fn new(url: &str, key_prefix: Option<&str>) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "connected to Redis for rankings");

        Ok(Self {
            conn,
            key_prefix: key_prefix.unwrap_or("points").to_string(),
        })
    }

    fn ranking_key(&self, point_type_id: &str) -> String {
        format!("{}:ranking:{}", self.key_prefix, point_type_id)
    }
}

#[async_trait]
impl RankingStore for RedisRankingStore {
    async fn update_score(&self, point_type_id: &str, user_id: &str, score: i64) -> Result<()> {
        let key = self.ranking_key(point_type_id);
        let mut conn = self.conn.clone();

        debug!(key = %key, user_id = %user_id, score, "updating ranking score");
        let _: () = conn.zadd(key, user_id, score).await?;
        Ok(())
    }

    async fn get_top(&self, point_type_id: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let key = self.ranking_key(point_type_id);
        let mut conn = self.conn.clone();

        // ZREVRANGE: descending score; Redis breaks ties by member order,
        // stable across repeated reads.
        let users: Vec<String> = conn
            .zrevrange(key, start as isize, stop as isize)
            .await?;
        Ok(users)
    }
}
