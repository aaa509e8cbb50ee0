//! Read projections.
//!
//! Every view answers "as of `now`" by running the same global plan and
//! account settlement the write path would, on scratch values. Nothing here
//! takes `&mut self`.

use trl_math::Integral;

use crate::account::AccountCheckpoint;
use crate::config::LedgerConfig;
use crate::ledger::Ledger;
use crate::oracle::{rebalance_through, RateSource, RebalanceSource, RewardToken};
use crate::types::{AccountId, AccountState, GlobalState, LedgerState, Tranche, TrancheAmounts};
use crate::weight::reward_weight;
use crate::LedgerError;

impl<R, P, T> Ledger<R, P, T>
where
    R: RebalanceSource,
    P: RateSource,
    T: RewardToken,
{
    /// Total supply of `tranche`, carried to the rebalance count at `now`.
    pub fn total_supply(&self, tranche: Tranche, now: u64) -> Result<u128, LedgerError> {
        let supplies = self.project(
            self.state.global.cursor.total_supplies,
            self.state.global.total_supply_version(),
            now,
        )?;
        Ok(supplies.get(tranche))
    }

    pub fn available_balance_of(
        &self,
        account: &AccountId,
        tranche: Tranche,
        now: u64,
    ) -> Result<u128, LedgerError> {
        let acct = self.account_or_default(account);
        Ok(self
            .project(acct.available, acct.balance_version, now)?
            .get(tranche))
    }

    pub fn locked_balance_of(
        &self,
        account: &AccountId,
        tranche: Tranche,
        now: u64,
    ) -> Result<u128, LedgerError> {
        let acct = self.account_or_default(account);
        Ok(self.project(acct.locked, acct.balance_version, now)?.get(tranche))
    }

    /// Version the stored balances are expressed in (0 for unknown accounts).
    pub fn balance_version(&self, account: &AccountId) -> u64 {
        self.state
            .accounts
            .get(account)
            .map(|a| a.balance_version)
            .unwrap_or(0)
    }

    /// Reward the account could claim at `now`.
    ///
    /// Uses whatever the global plan reaches within its step budget, so the
    /// figure can trail `now` when the ledger is far behind.
    pub fn claimable_rewards(&self, account: &AccountId, now: u64) -> Result<u128, LedgerError> {
        let delta = self.plan_global(now)?;
        let view = delta.view(&self.state.global);
        let settled = AccountCheckpoint::new(&self.rebalance).settle(
            &self.account_or_default(account),
            view.total_supply_version(),
            &view,
        )?;
        Ok(settled.account.claimable_reward)
    }

    /// Reward weight of the account's available + locked at `now`.
    pub fn reward_weight_of(&self, account: &AccountId, now: u64) -> Result<u128, LedgerError> {
        let acct = self.account_or_default(account);
        let held = self.project(acct.total()?, acct.balance_version, now)?;
        Ok(reward_weight(&held)?)
    }

    /// Final integral of closed version `version`.
    pub fn historical_integral(&self, version: u64) -> Result<Integral, LedgerError> {
        self.state.global.historical_integral(version)
    }

    pub fn global(&self) -> &GlobalState {
        &self.state.global
    }

    /// Stored (unsettled) state of `account`.
    pub fn account(&self, account: &AccountId) -> Option<&AccountState> {
        self.state.accounts.get(account)
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn into_state(self) -> LedgerState {
        self.state
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    /// Carry `amounts` from `version` to the rebalance count at `now`.
    fn project(
        &self,
        amounts: TrancheAmounts,
        version: u64,
        now: u64,
    ) -> Result<TrancheAmounts, LedgerError> {
        let count = self.rebalance.rebalance_count(now).max(version);
        rebalance_through(&self.rebalance, amounts, version, count)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::LedgerConfig;
    use crate::oracle::RewardToken;
    use crate::schedule::{RateSchedule, RebalanceRatios, RebalanceSchedule, ScheduledRebalance};
    use crate::types::{AccountId, Tranche};
    use crate::{Ledger, LedgerError};
    use trl_math::UNIT;

    struct Sink;

    impl RewardToken for Sink {
        fn mint(&mut self, _: &AccountId, _: u128) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    fn doubling_ledger() -> Ledger<RebalanceSchedule, RateSchedule, Sink> {
        let rb = RebalanceSchedule::new(vec![ScheduledRebalance {
            timestamp: 5,
            ratios: RebalanceRatios {
                ratio_m: 2 * UNIT,
                ..RebalanceRatios::IDENTITY
            },
        }])
        .unwrap();
        let cfg = LedgerConfig {
            week_secs: 1_000,
            settlement_secs: 0,
            ..LedgerConfig::default()
        };
        Ledger::new(cfg, rb, RateSchedule::constant(10 * UNIT, UNIT), Sink, 0).unwrap()
    }

    #[test]
    fn views_project_across_pending_rebalance_without_mutating() {
        let mut l = doubling_ledger();
        let alice = AccountId::from("alice");
        l.deposit(&alice, Tranche::M, 100 * UNIT, 0).unwrap();
        let before = l.state().clone();

        assert_eq!(l.total_supply(Tranche::M, 10).unwrap(), 200 * UNIT);
        assert_eq!(l.available_balance_of(&alice, Tranche::M, 10).unwrap(), 200 * UNIT);
        assert_eq!(l.reward_weight_of(&alice, 10).unwrap(), 200 * UNIT);
        assert_eq!(l.claimable_rewards(&alice, 10).unwrap(), 100 * UNIT);
        assert_eq!(l.balance_version(&alice), 0);

        assert_eq!(l.state(), &before);
    }

    #[test]
    fn unknown_account_reads_as_empty() {
        let l = doubling_ledger();
        let bob = AccountId::from("bob");
        assert_eq!(l.available_balance_of(&bob, Tranche::A, 10).unwrap(), 0);
        assert_eq!(l.claimable_rewards(&bob, 10).unwrap(), 0);
        assert!(l.account(&bob).is_none());
    }

    #[test]
    fn historical_integral_out_of_range() {
        let l = doubling_ledger();
        assert_eq!(
            l.historical_integral(0),
            Err(LedgerError::HistoryOutOfRange { version: 0, len: 0 })
        );
    }
}
