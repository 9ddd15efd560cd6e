pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod models;
pub mod ranking;
pub mod stores;
pub mod telemetry;

// Re-export the public surface
pub use config::EngineConfig;
pub use engine::{BalanceLedger, DistributionEngine, PointTypeRegistry, RedemptionEngine};
pub use errors::{PointsError, Result};
pub use models::{
    PointType, PointTypeUpdate, RedemptionRecord, RedemptionReward, RewardDistribution,
    RewardRule, Transaction, TransactionFilter, TransactionKind, TransactionPage, UserBalance,
};
pub use stores::{BalanceStore, BalanceTx, PointTypeStore, RankingStore, RedemptionStore, RewardStore};
