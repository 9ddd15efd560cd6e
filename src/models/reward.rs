use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maps an inclusive 1-based rank range in a point type's ranking pool to
/// a reward credited in (possibly another) point type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRule {
    pub id: String,
    pub point_type_id: String,
    pub min_rank: i64,
    pub max_rank: i64,
    pub reward_amount: i64,
    pub reward_point_type_id: String,
    pub active: bool,
}

/// Rule prior to insertion; the store assigns the id.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRewardRule {
    pub point_type_id: String,
    pub min_rank: i64,
    pub max_rank: i64,
    pub reward_amount: i64,
    pub reward_point_type_id: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionStatus {
    Pending,
    Completed,
    Failed,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One record per distribution run; created pending, finalized at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDistribution {
    pub id: String,
    pub snapshot_id: String,
    pub executed_at: i64,
    pub status: DistributionStatus,
}

/// A catalog reward purchasable with one or more point-type balances.
/// `costs` maps point type id to the amount required; all entries are
/// required simultaneously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionReward {
    pub id: String,
    pub name: String,
    pub description: String,
    pub costs: HashMap<String, i64>,
    pub quantity: i64,
    pub enabled: bool,
    pub total_redeemed: i64,
    pub created_at: i64,
}

/// Reward prior to insertion; the store assigns id and timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRedemptionReward {
    pub name: String,
    pub description: String,
    pub costs: HashMap<String, i64>,
    pub quantity: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Completed,
    Pending,
    Cancelled,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Record of a redemption carrying the exact cost vector charged.
/// Immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRecord {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub costs: HashMap<String, i64>,
    pub status: RedemptionStatus,
    pub created_at: i64,
}

/// Record prior to insertion; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewRedemptionRecord {
    pub user_id: String,
    pub reward_id: String,
    pub costs: HashMap<String, i64>,
    pub status: RedemptionStatus,
}
