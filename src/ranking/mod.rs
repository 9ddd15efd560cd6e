//! Redis implementation of the ranking store.

pub mod redis;

pub use self::redis::RedisRankingStore;
