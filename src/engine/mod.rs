//! The ledger-and-ranking engines.
//!
//! Each engine takes its store dependencies as constructor arguments;
//! wiring is the caller's job.

pub mod distribution;
pub mod ledger;
pub mod redemption;
pub mod registry;

pub use distribution::DistributionEngine;
pub use ledger::BalanceLedger;
pub use redemption::RedemptionEngine;
pub use registry::PointTypeRegistry;
