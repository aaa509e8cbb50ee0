//! Account checkpoint.
//!
//! Replays one account through every rebalance version it has not seen yet
//! and accrues its reward against the integrals the global checkpoint
//! produced for those versions.
//!
//! For each closed version `v` from `balance_version` up to the target:
//!
//! 1. `reward += weight(v) · (historical_integrals[v] − baseline)`
//! 2. balances are transformed into `v + 1` (skipped when both are zero)
//! 3. `baseline = 0`: the global integral restarts at zero in every version
//!
//! then the open interval of the target version is accrued against the
//! integral at the target (live when the target is the current version).
//!
//! An account holding nothing accrues nothing, so it jumps straight to the
//! target without reading any history.
//!
//! Pure with respect to the ledger: [`AccountCheckpoint::settle`] returns a
//! new [`AccountState`]; nothing is written until the façade commits it.

use tracing::debug;
use trl_math::{checked_add, Integral};

use crate::oracle::RebalanceSource;
use crate::types::{AccountState, GlobalView};
use crate::weight::reward_weight;
use crate::LedgerError;

/// Result of settling one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub account: AccountState,
    /// Reward accrued by this settlement alone.
    pub accrued: u128,
    pub versions_crossed: u64,
}

impl Settlement {
    fn unchanged(account: &AccountState) -> Self {
        Self {
            account: account.clone(),
            accrued: 0,
            versions_crossed: 0,
        }
    }
}

pub struct AccountCheckpoint<'a, R: ?Sized> {
    rebalance: &'a R,
}

impl<'a, R: RebalanceSource + ?Sized> AccountCheckpoint<'a, R> {
    pub fn new(rebalance: &'a R) -> Self {
        Self { rebalance }
    }

    /// Settle `account` up to `target_version` against `global`.
    ///
    /// - `target_version` beyond the global version is rejected: the global
    ///   checkpoint must have produced the integrals first.
    /// - An account already past `target_version` is returned unchanged
    ///   (settlement never moves backwards).
    /// - Settling twice against the same view is a no-op the second time.
    pub fn settle(
        &self,
        account: &AccountState,
        target_version: u64,
        global: &GlobalView<'_>,
    ) -> Result<Settlement, LedgerError> {
        let current_version = global.total_supply_version();
        if target_version > current_version {
            return Err(LedgerError::InvalidVersionTarget {
                requested: target_version,
                current: current_version,
            });
        }
        if account.balance_version > target_version {
            return Ok(Settlement::unchanged(account));
        }

        let end_integral = global.integral_at(target_version)?;
        if account.balance_version == target_version && account.user_integral == end_integral {
            return Ok(Settlement::unchanged(account));
        }
        if account.available.is_zero() && account.locked.is_zero() {
            return Ok(Self::jump_empty(account, target_version, end_integral));
        }

        let mut available = account.available;
        let mut locked = account.locked;
        let mut baseline = account.user_integral;
        let mut reward = account.claimable_reward;

        for version in account.balance_version..target_version {
            let weight = reward_weight(&available.checked_add(&locked)?)?;
            let closing = global.historical_integral(version)?;
            let accrued = closing.checked_sub(baseline)?.mul_amount(weight)?;
            reward = checked_add(reward, accrued)?;

            if !available.is_zero() || !locked.is_zero() {
                available = self.rebalance.apply_rebalance(available, version)?;
                locked = self.rebalance.apply_rebalance(locked, version)?;
            }
            baseline = Integral::ZERO;
        }

        let weight = reward_weight(&available.checked_add(&locked)?)?;
        let tail = end_integral.checked_sub(baseline)?.mul_amount(weight)?;
        reward = checked_add(reward, tail)?;

        let versions_crossed = target_version - account.balance_version;
        let mut settled = account.clone();
        settled.claimable_reward = reward;
        settled.user_integral = end_integral;
        if versions_crossed > 0 {
            settled.available = available;
            settled.locked = locked;
            settled.balance_version = target_version;
        }

        let accrued = reward - account.claimable_reward;
        debug!(
            from_version = account.balance_version,
            to_version = target_version,
            accrued,
            "account settled"
        );
        Ok(Settlement {
            account: settled,
            accrued,
            versions_crossed,
        })
    }

    fn jump_empty(
        account: &AccountState,
        target_version: u64,
        end_integral: Integral,
    ) -> Settlement {
        let mut settled = account.clone();
        settled.balance_version = target_version;
        settled.user_integral = end_integral;
        Settlement {
            account: settled,
            accrued: 0,
            versions_crossed: target_version - account.balance_version,
        }
    }
}
