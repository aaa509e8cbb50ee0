//! YAML scenario model.
//!
//! ```yaml
//! start_time: 0
//! rates:
//!   - { from: 0, rate: "10", relative_weight: "1" }
//! rebalances:
//!   - { timestamp: 5, ratio_m: "2" }
//! actions:
//!   - { at: 0, op: deposit, account: alice, tranche: M, amount: "100" }
//!   - { at: 10, op: claim, account: alice }
//! ```
//!
//! Amounts, rates and ratios are decimal strings scaled by `UNIT`, so
//! `"0.5"` is `5e17`. Actions must be in non-decreasing `at` order.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use trl_ledger::{
    RateSchedule, RateSegment, RebalanceRatios, RebalanceSchedule, ScheduledRebalance, Tranche,
    TrancheAmounts,
};
use trl_math::{Decimal, UNIT};

/// A `UNIT`-scaled value written as a decimal string.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(pub u128);

impl TryFrom<String> for Amount {
    type Error = trl_math::MathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(Amount(Decimal::from_str(&s)?.raw()))
    }
}

impl From<Amount> for String {
    fn from(a: Amount) -> String {
        a.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Decimal(self.0), f)
    }
}

/// Per-tranche amounts; missing tranches are zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmountsSpec {
    #[serde(rename = "M")]
    pub m: Amount,
    #[serde(rename = "A")]
    pub a: Amount,
    #[serde(rename = "B")]
    pub b: Amount,
}

impl AmountsSpec {
    pub fn to_amounts(self) -> TrancheAmounts {
        TrancheAmounts::new(self.m.0, self.a.0, self.b.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateSpec {
    pub from: u64,
    pub rate: Amount,
    pub relative_weight: Amount,
}

fn unit() -> Amount {
    Amount(UNIT)
}

/// Omitted ratios default to the identity rebalance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebalanceSpec {
    pub timestamp: u64,
    #[serde(default = "unit")]
    pub ratio_m: Amount,
    #[serde(default)]
    pub ratio_a2m: Amount,
    #[serde(default)]
    pub ratio_b2m: Amount,
    #[serde(default = "unit")]
    pub ratio_ab: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Deposit {
        account: String,
        tranche: Tranche,
        amount: Amount,
    },
    Withdraw {
        account: String,
        tranche: Tranche,
        amount: Amount,
    },
    Lock {
        account: String,
        tranche: Tranche,
        amount: Amount,
    },
    Unlock {
        account: String,
        amounts: AmountsSpec,
        version: u64,
    },
    TradeAvailable {
        account: String,
        tranche: Tranche,
        amount: Amount,
    },
    TradeLocked {
        account: String,
        tranche: Tranche,
        amount: Amount,
    },
    ClearTrade {
        account: String,
        amounts: AmountsSpec,
        version: u64,
    },
    Claim {
        account: String,
    },
    Refresh {
        account: String,
        #[serde(default)]
        target: Option<u64>,
    },
    /// One budget-bounded global checkpoint.
    Checkpoint,
    /// Global checkpoints until converged.
    Advance,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::Lock { .. } => "lock",
            Action::Unlock { .. } => "unlock",
            Action::TradeAvailable { .. } => "trade_available",
            Action::TradeLocked { .. } => "trade_locked",
            Action::ClearTrade { .. } => "clear_trade",
            Action::Claim { .. } => "claim",
            Action::Refresh { .. } => "refresh",
            Action::Checkpoint => "checkpoint",
            Action::Advance => "advance",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAction {
    pub at: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub start_time: u64,
    #[serde(default)]
    pub rates: Vec<RateSpec>,
    #[serde(default)]
    pub rebalances: Vec<RebalanceSpec>,
    #[serde(default)]
    pub actions: Vec<TimedAction>,
    /// Check supply conservation after every action. Only meaningful when
    /// every rebalance converts without rounding.
    #[serde(default)]
    pub check_conservation: bool,
}

impl Scenario {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(raw).context("invalid scenario yaml")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read scenario: {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("load scenario: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let mut last = self.start_time;
        for (i, a) in self.actions.iter().enumerate() {
            if a.at < last {
                bail!(
                    "SCENARIO_TIME_ORDER: action {i} ({}) at {} precedes {}",
                    a.action.name(),
                    a.at,
                    last
                );
            }
            last = a.at;
        }
        Ok(())
    }

    pub fn rate_schedule(&self) -> Result<RateSchedule> {
        let segments = self
            .rates
            .iter()
            .map(|r| RateSegment {
                from: r.from,
                rate: r.rate.0,
                relative_weight: r.relative_weight.0,
            })
            .collect();
        RateSchedule::new(segments).context("invalid rate schedule")
    }

    pub fn rebalance_schedule(&self) -> Result<RebalanceSchedule> {
        let entries = self
            .rebalances
            .iter()
            .map(|r| ScheduledRebalance {
                timestamp: r.timestamp,
                ratios: RebalanceRatios {
                    ratio_m: r.ratio_m.0,
                    ratio_a2m: r.ratio_a2m.0,
                    ratio_b2m: r.ratio_b2m.0,
                    ratio_ab: r.ratio_ab.0,
                },
            })
            .collect();
        RebalanceSchedule::new(entries).context("invalid rebalance schedule")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
start_time: 0
rates:
  - { from: 0, rate: "10", relative_weight: "1" }
rebalances:
  - { timestamp: 5, ratio_m: "2" }
actions:
  - { at: 0, op: deposit, account: alice, tranche: M, amount: "100" }
  - { at: 6, op: unlock, account: alice, amounts: { M: "0.5" }, version: 0 }
  - { at: 7, op: refresh, account: alice }
  - { at: 9, op: advance }
"#;

    #[test]
    fn parses_actions_and_amounts() {
        let s = Scenario::from_yaml_str(YAML).unwrap();
        assert_eq!(s.actions.len(), 4);
        assert_eq!(
            s.actions[0].action,
            Action::Deposit {
                account: "alice".into(),
                tranche: Tranche::M,
                amount: Amount(100 * UNIT),
            }
        );
        match &s.actions[1].action {
            Action::Unlock { amounts, .. } => {
                assert_eq!(amounts.to_amounts(), TrancheAmounts::new(UNIT / 2, 0, 0))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            s.actions[2].action,
            Action::Refresh {
                account: "alice".into(),
                target: None
            }
        );
        assert_eq!(s.actions[3].action, Action::Advance);
    }

    #[test]
    fn omitted_ratios_are_identity() {
        let s = Scenario::from_yaml_str(YAML).unwrap();
        let rb = s.rebalance_schedule().unwrap();
        let r = rb.entries()[0].ratios;
        assert_eq!(r.ratio_m, 2 * UNIT);
        assert_eq!(r.ratio_a2m, 0);
        assert_eq!(r.ratio_ab, UNIT);
    }

    #[test]
    fn out_of_order_actions_rejected() {
        let yaml = r#"
start_time: 10
actions:
  - { at: 5, op: checkpoint }
"#;
        let err = Scenario::from_yaml_str(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("SCENARIO_TIME_ORDER"));
    }

    #[test]
    fn bad_amount_rejected() {
        let yaml = r#"
start_time: 0
actions:
  - { at: 0, op: deposit, account: a, tranche: M, amount: "1e3" }
"#;
        assert!(Scenario::from_yaml_str(yaml).is_err());
    }
}
