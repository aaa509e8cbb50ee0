use std::fmt;

use trl_math::MathError;

use crate::types::{AccountId, Tranche};

/// Every failure a ledger operation can surface.
///
/// All variants abort the call: the façade stages global and account state
/// and only commits after the whole operation has succeeded, so an `Err`
/// never leaves a partial mutation behind.
///
/// A global checkpoint that stops on its iteration budget is NOT an error;
/// see [`AdvanceOutcome`](crate::AdvanceOutcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Withdraw / lock / trade / unlock asked for more than the account holds.
    InsufficientBalance {
        account: AccountId,
        tranche: Tranche,
        requested: u128,
        available: u128,
    },
    /// Fixed-point overflow, underflow or division by zero.
    Arithmetic(MathError),
    /// Requested version is beyond the rebalance count, or behind the
    /// account's balance version.
    InvalidVersionTarget { requested: u64, current: u64 },
    /// The global checkpoint has not reached `now` yet; call
    /// `Ledger::checkpoint` until it converges, then retry.
    CheckpointPending { reached: u64, now: u64 },
    /// The rebalance collaborator has no record of this version.
    UnknownRebalance { version: u64 },
    /// Read of `historical_integrals` past its end.
    HistoryOutOfRange { version: u64, len: u64 },
    /// The reward token refused to mint.
    RewardMint(String),
    /// Collaborator schedule is malformed (unsorted timestamps, ...).
    InvalidSchedule(String),
    /// Ledger configuration failed validation.
    InvalidConfig(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientBalance {
                account,
                tranche,
                requested,
                available,
            } => write!(
                f,
                "insufficient balance: account {account} tranche {tranche} \
                 requested {requested}, available {available}"
            ),
            Self::Arithmetic(e) => write!(f, "arithmetic failure: {e}"),
            Self::InvalidVersionTarget { requested, current } => write!(
                f,
                "invalid version target {requested} (current version {current})"
            ),
            Self::CheckpointPending { reached, now } => write!(
                f,
                "global checkpoint pending: reached {reached}, now {now}"
            ),
            Self::UnknownRebalance { version } => {
                write!(f, "rebalance collaborator has no version {version}")
            }
            Self::HistoryOutOfRange { version, len } => write!(
                f,
                "historical integral {version} out of range (len {len})"
            ),
            Self::RewardMint(msg) => write!(f, "reward mint failed: {msg}"),
            Self::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid ledger config: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Arithmetic(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MathError> for LedgerError {
    fn from(e: MathError) -> Self {
        LedgerError::Arithmetic(e)
    }
}
