//! Collaborator seams.
//!
//! The ledger never computes a rebalance, a rate, or a relative weight by
//! itself: it asks these traits.  Implementations must be deterministic for
//! a given input; the checkpoint algorithms call them repeatedly and expect
//! the same answers each time.

use crate::types::{AccountId, TrancheAmounts};
use crate::LedgerError;

/// Source of rebalance events (versions).
pub trait RebalanceSource {
    /// Number of rebalances that have happened as of `now`.
    fn rebalance_count(&self, now: u64) -> u64;

    /// When rebalance `version` (the transition `version -> version + 1`)
    /// took effect.
    fn rebalance_timestamp(&self, version: u64) -> Result<u64, LedgerError>;

    /// Express `amounts` (in `version`) in `version + 1`.
    fn apply_rebalance(
        &self,
        amounts: TrancheAmounts,
        version: u64,
    ) -> Result<TrancheAmounts, LedgerError>;
}

/// Source of the reward emission schedule.
pub trait RateSource {
    /// Global emission rate at `timestamp`, 1e18 per second.
    fn rate(&self, timestamp: u64) -> u128;

    /// `fund`'s share of the global emission at `timestamp`, 1e18 == 100%.
    fn relative_weight(&self, fund: &str, timestamp: u64) -> u128;
}

/// Receiver of claimed rewards.
pub trait RewardToken {
    fn mint(&mut self, account: &AccountId, amount: u128) -> Result<(), LedgerError>;
}

impl<T: RebalanceSource + ?Sized> RebalanceSource for &T {
    fn rebalance_count(&self, now: u64) -> u64 {
        (**self).rebalance_count(now)
    }

    fn rebalance_timestamp(&self, version: u64) -> Result<u64, LedgerError> {
        (**self).rebalance_timestamp(version)
    }

    fn apply_rebalance(
        &self,
        amounts: TrancheAmounts,
        version: u64,
    ) -> Result<TrancheAmounts, LedgerError> {
        (**self).apply_rebalance(amounts, version)
    }
}

impl<T: RateSource + ?Sized> RateSource for &T {
    fn rate(&self, timestamp: u64) -> u128 {
        (**self).rate(timestamp)
    }

    fn relative_weight(&self, fund: &str, timestamp: u64) -> u128 {
        (**self).relative_weight(fund, timestamp)
    }
}

/// Carry `amounts` from version `from` to version `to` one rebalance at a
/// time. Zero balances stay zero without asking the collaborator.
pub fn rebalance_through<R: RebalanceSource + ?Sized>(
    source: &R,
    amounts: TrancheAmounts,
    from: u64,
    to: u64,
) -> Result<TrancheAmounts, LedgerError> {
    let mut out = amounts;
    for version in from..to {
        if out.is_zero() {
            break;
        }
        out = source.apply_rebalance(out, version)?;
    }
    Ok(out)
}
