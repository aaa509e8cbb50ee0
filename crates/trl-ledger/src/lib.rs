//! trl-ledger
//!
//! Multi-tranche staking reward accrual.
//! - One pool holds three share classes (M, A, B); rewards are split by a
//!   fixed weight `(3M + 4A + 2B) / 3`
//! - Global integral of `rate · relative_weight / total_weight`, archived and
//!   reset at every rebalance
//! - Lazy per-account settlement across any number of missed rebalances
//! - Bounded work per checkpoint; partial progress is a result, not an error
//! - Pure deterministic logic (no IO, no wall clock); time is always passed in

mod account;
mod error;
mod global;
mod ledger;
mod types;
mod view;
mod weight;

pub mod config;
pub mod oracle;
pub mod schedule;

pub use account::{AccountCheckpoint, Settlement};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use global::{AdvanceOutcome, GlobalCheckpoint, GlobalDelta};
pub use ledger::Ledger;
pub use oracle::{rebalance_through, RateSource, RebalanceSource, RewardToken};
pub use schedule::{
    RateSchedule, RateSegment, RebalanceRatios, RebalanceSchedule, ScheduledRebalance,
};
pub use types::{
    AccountId, AccountState, GlobalCursor, GlobalState, GlobalView, LedgerState, Tranche,
    TrancheAmounts,
};
pub use trl_math::Integral;
pub use weight::{reward_weight, REWARD_WEIGHT_A, REWARD_WEIGHT_B, REWARD_WEIGHT_M};
