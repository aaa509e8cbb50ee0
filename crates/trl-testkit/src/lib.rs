//! trl-testkit
//!
//! Deterministic harness around `trl-ledger`:
//! - reward token fakes (recording, always-failing)
//! - YAML scenario model with decimal-string amounts
//! - scenario runner producing a serializable report
//! - invariant checks run after every scenario action

pub mod invariants;
pub mod runner;
pub mod scenario;
pub mod token;

pub use invariants::{check_all, history_lockstep, supply_conservation};
pub use runner::{
    AccountReport, AmountsReport, FailedAction, ScenarioLedger, ScenarioReport, ScenarioRunner,
    Violation,
};
pub use scenario::{Action, Amount, AmountsSpec, Scenario, TimedAction};
pub use token::{FailingRewardToken, MintRecord, RecordingRewardToken};
