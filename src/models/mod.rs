pub mod balance;
pub mod point_type;
pub mod reward;

pub use balance::{
    NewTransaction, Transaction, TransactionFilter, TransactionKind, TransactionPage, UserBalance,
};
pub use point_type::{PointType, PointTypeUpdate};
pub use reward::{
    DistributionStatus, NewRedemptionRecord, NewRedemptionReward, NewRewardRule,
    RedemptionRecord, RedemptionReward, RedemptionStatus, RewardDistribution, RewardRule,
};
