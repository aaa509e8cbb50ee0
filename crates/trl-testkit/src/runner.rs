//! Drives a [`Ledger`] through a [`Scenario`] and reports the outcome.
//!
//! Failed actions do not stop the run: the ledger rolls them back, the
//! runner records them in [`ScenarioReport::failures`] and moves on.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trl_ledger::{
    AccountId, Ledger, LedgerConfig, LedgerError, RateSchedule, RebalanceSchedule, Tranche,
    TrancheAmounts,
};
use trl_math::Decimal;

use crate::invariants::check_all;
use crate::scenario::{Action, Scenario, TimedAction};
use crate::token::RecordingRewardToken;

/// Ledger type every scenario runs against.
pub type ScenarioLedger = Ledger<RebalanceSchedule, RateSchedule, RecordingRewardToken>;

/// Upper bound on checkpoint calls for one `advance` action.
pub const MAX_ADVANCE_ROUNDS: u32 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountsReport {
    #[serde(rename = "M")]
    pub m: String,
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
}

impl From<TrancheAmounts> for AmountsReport {
    fn from(t: TrancheAmounts) -> Self {
        Self {
            m: Decimal(t.m).to_string(),
            a: Decimal(t.a).to_string(),
            b: Decimal(t.b).to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReport {
    /// Balances carried to the rebalance count at `final_time`.
    pub available: AmountsReport,
    pub locked: AmountsReport,
    /// Version the stored balances are expressed in.
    pub balance_version: u64,
    /// Projected claimable reward at `final_time`.
    pub claimable: String,
    /// Sum of everything minted to this account.
    pub minted: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAction {
    pub index: usize,
    pub at: u64,
    pub op: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub index: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: Option<String>,
    pub final_time: u64,
    pub actions_applied: usize,
    pub total_supply_version: u64,
    pub checkpoint_timestamp: u64,
    pub total_supplies: AmountsReport,
    /// Closed-version integrals, raw 1e27-scaled integers.
    pub historical_integrals: Vec<String>,
    pub accounts: BTreeMap<String, AccountReport>,
    pub total_minted: String,
    pub failures: Vec<FailedAction>,
    pub invariant_violations: Vec<Violation>,
}

impl ScenarioReport {
    pub fn account(&self, id: &str) -> Option<&AccountReport> {
        self.accounts.get(id)
    }
}

pub struct ScenarioRunner {
    config: LedgerConfig,
}

impl ScenarioRunner {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        Ok(self.run_ledger(scenario)?.0)
    }

    /// Like [`run`](Self::run), also handing back the final ledger.
    pub fn run_ledger(&self, scenario: &Scenario) -> Result<(ScenarioReport, ScenarioLedger)> {
        scenario.validate()?;
        let mut ledger = Ledger::new(
            self.config.clone(),
            scenario.rebalance_schedule()?,
            scenario.rate_schedule()?,
            RecordingRewardToken::new(),
            scenario.start_time,
        )
        .context("ledger init failed")?;

        info!(
            name = scenario.name.as_deref().unwrap_or("<unnamed>"),
            actions = scenario.actions.len(),
            "scenario start"
        );

        let mut applied = 0usize;
        let mut failures = Vec::new();
        let mut violations = Vec::new();
        for (index, ta) in scenario.actions.iter().enumerate() {
            match apply(&mut ledger, ta) {
                Ok(()) => {
                    applied += 1;
                    debug!(index, at = ta.at, op = ta.action.name(), "action applied");
                }
                Err(e) => {
                    warn!(index, at = ta.at, op = ta.action.name(), error = %e, "action failed");
                    failures.push(FailedAction {
                        index,
                        at: ta.at,
                        op: ta.action.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
            for message in check_all(&ledger, scenario.check_conservation) {
                warn!(index, %message, "invariant violated");
                violations.push(Violation { index, message });
            }
        }

        let final_time = scenario
            .actions
            .last()
            .map(|a| a.at)
            .unwrap_or(scenario.start_time);
        let report = build_report(&ledger, scenario, final_time, applied, failures, violations)?;
        info!(
            applied = report.actions_applied,
            failed = report.failures.len(),
            version = report.total_supply_version,
            "scenario done"
        );
        Ok((report, ledger))
    }
}

fn apply(ledger: &mut ScenarioLedger, ta: &TimedAction) -> Result<(), LedgerError> {
    let now = ta.at;
    match &ta.action {
        Action::Deposit {
            account,
            tranche,
            amount,
        } => ledger.deposit(&AccountId::from(account.as_str()), *tranche, amount.0, now),
        Action::Withdraw {
            account,
            tranche,
            amount,
        } => ledger.withdraw(&AccountId::from(account.as_str()), *tranche, amount.0, now),
        Action::Lock {
            account,
            tranche,
            amount,
        } => ledger.lock(&AccountId::from(account.as_str()), *tranche, amount.0, now),
        Action::Unlock {
            account,
            amounts,
            version,
        } => ledger.unlock(
            &AccountId::from(account.as_str()),
            amounts.to_amounts(),
            *version,
            now,
        ),
        Action::TradeAvailable {
            account,
            tranche,
            amount,
        } => ledger.trade_available(&AccountId::from(account.as_str()), *tranche, amount.0, now),
        Action::TradeLocked {
            account,
            tranche,
            amount,
        } => ledger.trade_locked(&AccountId::from(account.as_str()), *tranche, amount.0, now),
        Action::ClearTrade {
            account,
            amounts,
            version,
        } => ledger.convert_and_clear_trade(
            &AccountId::from(account.as_str()),
            amounts.to_amounts(),
            *version,
            now,
        ),
        Action::Claim { account } => ledger
            .claim(&AccountId::from(account.as_str()), now)
            .map(|_| ()),
        Action::Refresh { account, target } => {
            ledger.refresh_balance(&AccountId::from(account.as_str()), *target, now)
        }
        Action::Checkpoint => ledger.checkpoint(now).map(|_| ()),
        Action::Advance => {
            for _ in 0..MAX_ADVANCE_ROUNDS {
                if ledger.checkpoint(now)?.converged {
                    return Ok(());
                }
            }
            Err(LedgerError::CheckpointPending {
                reached: ledger.global().checkpoint_timestamp(),
                now,
            })
        }
    }
}

fn build_report(
    ledger: &ScenarioLedger,
    scenario: &Scenario,
    final_time: u64,
    actions_applied: usize,
    failures: Vec<FailedAction>,
    invariant_violations: Vec<Violation>,
) -> Result<ScenarioReport> {
    let global = ledger.global();
    let mut accounts = BTreeMap::new();
    for (id, state) in &ledger.state().accounts {
        let balances = |locked: bool| -> Result<AmountsReport> {
            let mut out = TrancheAmounts::ZERO;
            for tranche in Tranche::ALL {
                let v = if locked {
                    ledger.locked_balance_of(id, tranche, final_time)?
                } else {
                    ledger.available_balance_of(id, tranche, final_time)?
                };
                out = out.with_added(tranche, v)?;
            }
            Ok(out.into())
        };
        accounts.insert(
            id.to_string(),
            AccountReport {
                available: balances(false)?,
                locked: balances(true)?,
                balance_version: state.balance_version,
                claimable: Decimal(ledger.claimable_rewards(id, final_time)?).to_string(),
                minted: Decimal(ledger.token().minted_to(id)).to_string(),
            },
        );
    }

    Ok(ScenarioReport {
        name: scenario.name.clone(),
        final_time,
        actions_applied,
        total_supply_version: global.total_supply_version(),
        checkpoint_timestamp: global.checkpoint_timestamp(),
        total_supplies: global.cursor.total_supplies.into(),
        historical_integrals: global
            .historical_integrals()
            .iter()
            .map(|v| v.to_string())
            .collect(),
        accounts,
        total_minted: Decimal(ledger.token().total_minted()).to_string(),
        failures,
        invariant_violations,
    })
}
