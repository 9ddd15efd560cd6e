//! Postgres implementations of the store contracts.

pub mod balances;
pub mod connection;
pub mod point_types;
pub mod redemptions;
pub mod rewards;

pub use balances::PgBalanceStore;
pub use connection::{create_pool, health_check};
pub use point_types::PgPointTypeStore;
pub use redemptions::PgRedemptionStore;
pub use rewards::PgRewardStore;
