use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use trl_math::{checked_add, checked_sub, Integral, MathError};

use crate::LedgerError;

/// One of the three share classes held in the pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tranche {
    M,
    A,
    B,
}

impl Tranche {
    pub const ALL: [Tranche; 3] = [Tranche::M, Tranche::A, Tranche::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tranche::M => "M",
            Tranche::A => "A",
            Tranche::B => "B",
        }
    }
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 3-way balance `(M, A, B)` at 1e18 scale, always tied to some rebalance
/// version by its owner.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheAmounts {
    pub m: u128,
    pub a: u128,
    pub b: u128,
}

impl TrancheAmounts {
    pub const ZERO: TrancheAmounts = TrancheAmounts { m: 0, a: 0, b: 0 };

    pub const fn new(m: u128, a: u128, b: u128) -> Self {
        Self { m, a, b }
    }

    /// `amount` in `tranche`, zero elsewhere.
    pub fn single(tranche: Tranche, amount: u128) -> Self {
        let mut out = Self::ZERO;
        *out.slot_mut(tranche) = amount;
        out
    }

    pub fn get(&self, tranche: Tranche) -> u128 {
        match tranche {
            Tranche::M => self.m,
            Tranche::A => self.a,
            Tranche::B => self.b,
        }
    }

    fn slot_mut(&mut self, tranche: Tranche) -> &mut u128 {
        match tranche {
            Tranche::M => &mut self.m,
            Tranche::A => &mut self.a,
            Tranche::B => &mut self.b,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.m == 0 && self.a == 0 && self.b == 0
    }

    /// Tranche-wise sum.
    pub fn checked_add(&self, other: &TrancheAmounts) -> Result<TrancheAmounts, MathError> {
        Ok(TrancheAmounts {
            m: checked_add(self.m, other.m)?,
            a: checked_add(self.a, other.a)?,
            b: checked_add(self.b, other.b)?,
        })
    }

    /// Tranche-wise difference; fails if any component would go negative.
    pub fn checked_sub(&self, other: &TrancheAmounts) -> Result<TrancheAmounts, MathError> {
        Ok(TrancheAmounts {
            m: checked_sub(self.m, other.m)?,
            a: checked_sub(self.a, other.a)?,
            b: checked_sub(self.b, other.b)?,
        })
    }

    pub fn with_added(&self, tranche: Tranche, amount: u128) -> Result<TrancheAmounts, MathError> {
        let mut out = *self;
        let slot = out.slot_mut(tranche);
        *slot = checked_add(*slot, amount)?;
        Ok(out)
    }

    pub fn with_subtracted(
        &self,
        tranche: Tranche,
        amount: u128,
    ) -> Result<TrancheAmounts, MathError> {
        let mut out = *self;
        let slot = out.slot_mut(tranche);
        *slot = checked_sub(*slot, amount)?;
        Ok(out)
    }
}

/// Account identity. Opaque to the ledger; ordered so iteration is
/// deterministic.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Global state
// ---------------------------------------------------------------------------

/// The fixed-size part of the global state. `Copy` so a checkpoint can be
/// computed on a scratch value and committed only on success.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCursor {
    /// Emission rate (1e18 per second) for the week in progress.
    pub rate: u128,
    /// Fund's share of the emission (1e18 == 100%) for the week in progress.
    pub relative_weight: u128,
    /// Sum of every account's available + locked, in `total_supply_version`.
    pub total_supplies: TrancheAmounts,
    pub total_supply_version: u64,
    /// Time up to which the integral has been accumulated.
    pub checkpoint_timestamp: u64,
    /// ∫ rate · relative_weight / weight dt since the start of the current
    /// version, at 1e27 scale.
    pub inv_total_weight_integral: Integral,
}

/// Global accrual state.
///
/// `historical_integrals[v]` is the final integral of version `v`; the vector
/// only grows, and after every committed checkpoint its length equals
/// `cursor.total_supply_version`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub cursor: GlobalCursor,
    historical_integrals: Vec<Integral>,
}

impl GlobalState {
    pub fn new(cursor: GlobalCursor) -> Self {
        Self {
            cursor,
            historical_integrals: Vec::new(),
        }
    }

    pub fn total_supply_version(&self) -> u64 {
        self.cursor.total_supply_version
    }

    pub fn checkpoint_timestamp(&self) -> u64 {
        self.cursor.checkpoint_timestamp
    }

    pub fn historical_integrals(&self) -> &[Integral] {
        &self.historical_integrals
    }

    /// Bounds-checked read of a closed version's final integral.
    pub fn historical_integral(&self, version: u64) -> Result<Integral, LedgerError> {
        self.view().historical_integral(version)
    }

    /// Read view with nothing staged on top.
    pub fn view(&self) -> GlobalView<'_> {
        GlobalView {
            cursor: &self.cursor,
            committed: &self.historical_integrals,
            pending: &[],
        }
    }

    pub(crate) fn append_historical(&mut self, integrals: Vec<Integral>) {
        self.historical_integrals.extend(integrals);
    }
}

/// Read-only view of global state, optionally with a staged (not yet
/// committed) checkpoint layered on top.
#[derive(Copy, Clone, Debug)]
pub struct GlobalView<'a> {
    pub(crate) cursor: &'a GlobalCursor,
    pub(crate) committed: &'a [Integral],
    pub(crate) pending: &'a [Integral],
}

impl<'a> GlobalView<'a> {
    pub fn cursor(&self) -> &GlobalCursor {
        self.cursor
    }

    pub fn total_supply_version(&self) -> u64 {
        self.cursor.total_supply_version
    }

    /// The live integral of the current version.
    pub fn current_integral(&self) -> Integral {
        self.cursor.inv_total_weight_integral
    }

    pub fn history_len(&self) -> u64 {
        (self.committed.len() + self.pending.len()) as u64
    }

    pub fn historical_integral(&self, version: u64) -> Result<Integral, LedgerError> {
        let idx = version as usize;
        let out_of_range = LedgerError::HistoryOutOfRange {
            version,
            len: self.history_len(),
        };
        if idx < self.committed.len() {
            return Ok(self.committed[idx]);
        }
        self.pending
            .get(idx - self.committed.len())
            .copied()
            .ok_or(out_of_range)
    }

    /// Integral at the end of `version`'s epoch as far as it has run:
    /// historical when `version` is closed, live when it is current.
    pub fn integral_at(&self, version: u64) -> Result<Integral, LedgerError> {
        if version == self.total_supply_version() {
            Ok(self.current_integral())
        } else {
            self.historical_integral(version)
        }
    }
}

// ---------------------------------------------------------------------------
// Per-account state
// ---------------------------------------------------------------------------

/// Per-account balances and reward bookkeeping.
///
/// `available` and `locked` are expressed in `balance_version`, which is
/// never ahead of the global `total_supply_version`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub available: TrancheAmounts,
    pub locked: TrancheAmounts,
    pub balance_version: u64,
    /// Integral value (within `balance_version`'s epoch) at last settlement.
    pub user_integral: Integral,
    pub claimable_reward: u128,
}

impl AccountState {
    /// Available + locked, tranche-wise.
    pub fn total(&self) -> Result<TrancheAmounts, MathError> {
        self.available.checked_add(&self.locked)
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_zero() && self.locked.is_zero() && self.claimable_reward == 0
    }
}

/// The authoritative store: global state plus every account keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub global: GlobalState,
    pub accounts: BTreeMap<AccountId, AccountState>,
}
