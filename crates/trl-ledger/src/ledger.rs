//! Ledger façade: the only write surface over [`LedgerState`].
//!
//! # Purpose
//!
//! [`global`](crate::global) and [`account`](crate::account) contain the
//! accrual mechanics. This module wraps them behind [`Ledger`], which:
//!
//! - Runs the global checkpoint, then settles the touched account, then
//!   applies the balance mutation: balances are never changed against a
//!   stale integral.
//! - Stages all three steps on scratch values and commits only when the
//!   whole operation succeeded, so an `Err` leaves the ledger untouched.
//! - Exposes read-only projections (see `view.rs`) that simulate the same
//!   checkpoints without persisting them.
//!
//! # Usage
//! ```ignore
//! let mut ledger = Ledger::new(cfg, rebalances, rates, token, start)?;
//! ledger.deposit(&"alice".into(), Tranche::M, 100 * UNIT, start)?;
//! let paid = ledger.claim(&"alice".into(), start + 3_600)?;
//! ```
//!
//! # Partial global progress
//! A mutating operation needs the global state to reach `now`. When the
//! step budget runs out first, the operation fails with
//! [`LedgerError::CheckpointPending`]; call [`Ledger::checkpoint`] until it
//! reports `converged`, then retry.

use tracing::{debug, info};
use trl_math::Integral;

use crate::account::AccountCheckpoint;
use crate::config::LedgerConfig;
use crate::global::{AdvanceOutcome, GlobalCheckpoint, GlobalDelta};
use crate::oracle::{rebalance_through, RateSource, RebalanceSource, RewardToken};
use crate::types::{
    AccountId, AccountState, GlobalCursor, GlobalState, LedgerState, Tranche, TrancheAmounts,
};
use crate::LedgerError;

/// Global delta plus the touched account, settled against it.
struct Staged {
    delta: GlobalDelta,
    account: AccountState,
}

impl Staged {
    fn version(&self) -> u64 {
        self.delta.cursor.total_supply_version
    }
}

/// Multi-tranche staking ledger.
#[derive(Debug)]
pub struct Ledger<R, P, T> {
    pub(crate) config: LedgerConfig,
    pub(crate) state: LedgerState,
    pub(crate) rebalance: R,
    pub(crate) rates: P,
    pub(crate) token: T,
}

impl<R, P, T> Ledger<R, P, T>
where
    R: RebalanceSource,
    P: RateSource,
    T: RewardToken,
{
    /// Fresh ledger whose clock starts at `start_time`.
    ///
    /// Versions that already happened before `start_time` are recorded with
    /// a zero closing integral (nothing was staked yet).
    pub fn new(
        config: LedgerConfig,
        rebalance: R,
        rates: P,
        token: T,
        start_time: u64,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        let week_start = config.week_start(start_time);
        let version = rebalance.rebalance_count(start_time);
        let mut global = GlobalState::new(GlobalCursor {
            rate: rates.rate(week_start),
            relative_weight: rates.relative_weight(&config.fund_id, week_start),
            total_supplies: TrancheAmounts::ZERO,
            total_supply_version: version,
            checkpoint_timestamp: start_time,
            inv_total_weight_integral: Integral::ZERO,
        });
        global.append_historical(vec![Integral::ZERO; version as usize]);
        info!(
            fund = %config.fund_id,
            start_time,
            version,
            rate = global.cursor.rate,
            "ledger initialised"
        );
        Ok(Self {
            config,
            state: LedgerState {
                global,
                accounts: Default::default(),
            },
            rebalance,
            rates,
            token,
        })
    }

    /// Resume from a persisted state.
    pub fn from_state(
        config: LedgerConfig,
        state: LedgerState,
        rebalance: R,
        rates: P,
        token: T,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        let version = state.global.total_supply_version();
        let len = state.global.historical_integrals().len() as u64;
        if len != version {
            return Err(LedgerError::HistoryOutOfRange { version, len });
        }
        Ok(Self {
            config,
            state,
            rebalance,
            rates,
            token,
        })
    }

    // -----------------------------------------------------------------------
    // Global checkpoint
    // -----------------------------------------------------------------------

    /// Advance the global integral towards `now`, committing whatever
    /// progress the step budget allows.
    pub fn checkpoint(&mut self, now: u64) -> Result<AdvanceOutcome, LedgerError> {
        let delta = self.plan_global(now)?;
        Ok(self.state.global.apply(delta))
    }

    // -----------------------------------------------------------------------
    // Write surface
    // -----------------------------------------------------------------------

    pub fn deposit(
        &mut self,
        account: &AccountId,
        tranche: Tranche,
        amount: u128,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        staged.account.available = staged.account.available.with_added(tranche, amount)?;
        staged.delta.cursor.total_supplies =
            staged.delta.cursor.total_supplies.with_added(tranche, amount)?;
        debug!(account = %account, %tranche, amount, "deposit");
        self.commit(account, staged);
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        account: &AccountId,
        tranche: Tranche,
        amount: u128,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        staged.account.available = take(&staged.account.available, account, tranche, amount)?;
        staged.delta.cursor.total_supplies =
            staged.delta.cursor.total_supplies.with_subtracted(tranche, amount)?;
        debug!(account = %account, %tranche, amount, "withdraw");
        self.commit(account, staged);
        Ok(())
    }

    /// Move shares from available to locked (e.g. backing an open order).
    /// Locked shares keep earning rewards.
    pub fn lock(
        &mut self,
        account: &AccountId,
        tranche: Tranche,
        amount: u128,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        staged.account.available = take(&staged.account.available, account, tranche, amount)?;
        staged.account.locked = staged.account.locked.with_added(tranche, amount)?;
        debug!(account = %account, %tranche, amount, "lock");
        self.commit(account, staged);
        Ok(())
    }

    /// Move shares from locked back to available. `amounts` are expressed in
    /// `amount_version` and are rebalanced to the current version first.
    pub fn unlock(
        &mut self,
        account: &AccountId,
        amounts: TrancheAmounts,
        amount_version: u64,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        let amounts = self.carry_to_current(amounts, amount_version, staged.version())?;
        for tranche in Tranche::ALL {
            let amount = amounts.get(tranche);
            staged.account.locked = take(&staged.account.locked, account, tranche, amount)?;
            staged.account.available = staged.account.available.with_added(tranche, amount)?;
        }
        debug!(account = %account, amount_version, "unlock");
        self.commit(account, staged);
        Ok(())
    }

    /// Shares leave the pool from the available balance (sold to a
    /// counterparty outside the ledger).
    pub fn trade_available(
        &mut self,
        account: &AccountId,
        tranche: Tranche,
        amount: u128,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        staged.account.available = take(&staged.account.available, account, tranche, amount)?;
        staged.delta.cursor.total_supplies =
            staged.delta.cursor.total_supplies.with_subtracted(tranche, amount)?;
        debug!(account = %account, %tranche, amount, "trade available");
        self.commit(account, staged);
        Ok(())
    }

    /// Shares leave the pool from the locked balance (an order backed by
    /// locked shares was filled).
    pub fn trade_locked(
        &mut self,
        account: &AccountId,
        tranche: Tranche,
        amount: u128,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        staged.account.locked = take(&staged.account.locked, account, tranche, amount)?;
        staged.delta.cursor.total_supplies =
            staged.delta.cursor.total_supplies.with_subtracted(tranche, amount)?;
        debug!(account = %account, %tranche, amount, "trade locked");
        self.commit(account, staged);
        Ok(())
    }

    /// Shares bought outside the ledger settle into the available balance.
    /// `amounts` are expressed in `amount_version`.
    pub fn convert_and_clear_trade(
        &mut self,
        account: &AccountId,
        amounts: TrancheAmounts,
        amount_version: u64,
        now: u64,
    ) -> Result<(), LedgerError> {
        let mut staged = self.stage(account, now)?;
        let amounts = self.carry_to_current(amounts, amount_version, staged.version())?;
        staged.account.available = staged.account.available.checked_add(&amounts)?;
        staged.delta.cursor.total_supplies =
            staged.delta.cursor.total_supplies.checked_add(&amounts)?;
        debug!(account = %account, amount_version, "trade cleared");
        self.commit(account, staged);
        Ok(())
    }

    /// Mint everything the account has accrued and reset it to zero.
    pub fn claim(&mut self, account: &AccountId, now: u64) -> Result<u128, LedgerError> {
        let mut staged = self.stage(account, now)?;
        let amount = staged.account.claimable_reward;
        if amount > 0 {
            self.token.mint(account, amount)?;
        }
        staged.account.claimable_reward = 0;
        info!(account = %account, amount, "rewards claimed");
        self.commit(account, staged);
        Ok(amount)
    }

    /// Settle an account to `target` (the current rebalance count when
    /// `None`). A historical target settles balances and rewards as of the
    /// end of that version.
    pub fn refresh_balance(
        &mut self,
        account: &AccountId,
        target: Option<u64>,
        now: u64,
    ) -> Result<(), LedgerError> {
        let delta = self.converged_delta(now)?;
        let current = delta.cursor.total_supply_version;
        let target = target.unwrap_or(current);
        if target > current {
            return Err(LedgerError::InvalidVersionTarget {
                requested: target,
                current,
            });
        }
        let existing = self.account_or_default(account);
        if existing.balance_version > target {
            return Err(LedgerError::InvalidVersionTarget {
                requested: target,
                current: existing.balance_version,
            });
        }
        let settled = {
            let view = delta.view(&self.state.global);
            AccountCheckpoint::new(&self.rebalance).settle(&existing, target, &view)?
        };
        debug!(
            account = %account,
            target,
            crossed = settled.versions_crossed,
            "balance refreshed"
        );
        self.commit(
            account,
            Staged {
                delta,
                account: settled.account,
            },
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    /// Sum of every account's balance, carried to the global version, equals
    /// `total_supplies`.
    ///
    /// Holds exactly when the rebalance transform is linear without rounding
    /// (sum of floors can trail floor of sums otherwise). O(accounts ×
    /// pending versions): for tests and audit flows.
    pub fn verify_conservation(&self) -> Result<bool, LedgerError> {
        let version = self.state.global.total_supply_version();
        let mut sum = TrancheAmounts::ZERO;
        for acct in self.state.accounts.values() {
            let held = acct.total()?;
            let carried = rebalance_through(&self.rebalance, held, acct.balance_version, version)?;
            sum = sum.checked_add(&carried)?;
        }
        Ok(sum == self.state.global.cursor.total_supplies)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    pub(crate) fn plan_global(&self, now: u64) -> Result<GlobalDelta, LedgerError> {
        let count = self.rebalance.rebalance_count(now);
        GlobalCheckpoint::new(&self.config, &self.rebalance, &self.rates).plan(
            &self.state.global,
            now,
            count,
        )
    }

    fn converged_delta(&self, now: u64) -> Result<GlobalDelta, LedgerError> {
        let delta = self.plan_global(now)?;
        if !delta.outcome.converged {
            return Err(LedgerError::CheckpointPending {
                reached: delta.outcome.reached,
                now,
            });
        }
        Ok(delta)
    }

    pub(crate) fn account_or_default(&self, account: &AccountId) -> AccountState {
        self.state
            .accounts
            .get(account)
            .cloned()
            .unwrap_or_default()
    }

    /// Global checkpoint to `now`, then the account settled to the version
    /// that checkpoint reached.
    fn stage(&self, account: &AccountId, now: u64) -> Result<Staged, LedgerError> {
        let delta = self.converged_delta(now)?;
        let existing = self.account_or_default(account);
        let settled = {
            let view = delta.view(&self.state.global);
            AccountCheckpoint::new(&self.rebalance).settle(
                &existing,
                view.total_supply_version(),
                &view,
            )?
        };
        Ok(Staged {
            delta,
            account: settled.account,
        })
    }

    fn commit(&mut self, account: &AccountId, staged: Staged) {
        let Staged { delta, account: acct } = staged;
        self.state.global.apply(delta);
        self.state.accounts.insert(account.clone(), acct);
    }

    fn carry_to_current(
        &self,
        amounts: TrancheAmounts,
        amount_version: u64,
        current: u64,
    ) -> Result<TrancheAmounts, LedgerError> {
        if amount_version > current {
            return Err(LedgerError::InvalidVersionTarget {
                requested: amount_version,
                current,
            });
        }
        rebalance_through(&self.rebalance, amounts, amount_version, current)
    }
}

/// `from - amount` in `tranche`, or `InsufficientBalance`.
fn take(
    from: &TrancheAmounts,
    account: &AccountId,
    tranche: Tranche,
    amount: u128,
) -> Result<TrancheAmounts, LedgerError> {
    let held = from.get(tranche);
    if held < amount {
        return Err(LedgerError::InsufficientBalance {
            account: account.clone(),
            tranche,
            requested: amount,
            available: held,
        });
    }
    Ok(from.with_subtracted(tranche, amount)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
