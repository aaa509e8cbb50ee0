//! Invariant checks run between scenario actions.

use trl_ledger::{Ledger, LedgerState, RateSource, RebalanceSource, RewardToken};

/// `historical_integrals.len() == total_supply_version`.
pub fn history_lockstep(state: &LedgerState) -> Option<String> {
    let len = state.global.historical_integrals().len() as u64;
    let version = state.global.total_supply_version();
    (len != version).then(|| format!("history length {len} != version {version}"))
}

/// Every account's balance, carried to the global version, sums to
/// `total_supplies`.
pub fn supply_conservation<R, P, T>(ledger: &Ledger<R, P, T>) -> Option<String>
where
    R: RebalanceSource,
    P: RateSource,
    T: RewardToken,
{
    match ledger.verify_conservation() {
        Ok(true) => None,
        Ok(false) => Some(format!(
            "account balances do not sum to total supplies {:?}",
            ledger.global().cursor.total_supplies
        )),
        Err(e) => Some(format!("conservation check failed: {e}")),
    }
}

/// Every violated invariant, empty when the ledger is consistent.
pub fn check_all<R, P, T>(ledger: &Ledger<R, P, T>, conservation: bool) -> Vec<String>
where
    R: RebalanceSource,
    P: RateSource,
    T: RewardToken,
{
    let mut out = Vec::new();
    out.extend(history_lockstep(ledger.state()));
    if conservation {
        out.extend(supply_conservation(ledger));
    }
    out
}
