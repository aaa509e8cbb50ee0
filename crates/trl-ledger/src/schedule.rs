//! Schedule-backed collaborators.
//!
//! [`RebalanceSchedule`] and [`RateSchedule`] implement the collaborator
//! traits from a fixed, pre-validated list of events.  They are what the
//! scenario runner and the CLI plug into a [`Ledger`](crate::Ledger); any
//! production source only has to implement the same traits.

use trl_math::{checked_add, multiply_decimal, UNIT};

use crate::oracle::{RateSource, RebalanceSource};
use crate::types::TrancheAmounts;
use crate::LedgerError;

// ---------------------------------------------------------------------------
// Rebalances
// ---------------------------------------------------------------------------

/// Conversion ratios of one rebalance, all at 1e18 scale.
///
/// ```text
/// M' = M·ratio_m + A·ratio_a2m + B·ratio_b2m
/// A' = A·ratio_ab
/// B' = B·ratio_ab
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RebalanceRatios {
    pub ratio_m: u128,
    pub ratio_a2m: u128,
    pub ratio_b2m: u128,
    pub ratio_ab: u128,
}

impl RebalanceRatios {
    /// A rebalance that changes nothing.
    pub const IDENTITY: RebalanceRatios = RebalanceRatios {
        ratio_m: UNIT,
        ratio_a2m: 0,
        ratio_b2m: 0,
        ratio_ab: UNIT,
    };

    pub fn apply(&self, amounts: TrancheAmounts) -> Result<TrancheAmounts, LedgerError> {
        let m = checked_add(
            checked_add(
                multiply_decimal(amounts.m, self.ratio_m)?,
                multiply_decimal(amounts.a, self.ratio_a2m)?,
            )?,
            multiply_decimal(amounts.b, self.ratio_b2m)?,
        )?;
        Ok(TrancheAmounts {
            m,
            a: multiply_decimal(amounts.a, self.ratio_ab)?,
            b: multiply_decimal(amounts.b, self.ratio_ab)?,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScheduledRebalance {
    pub timestamp: u64,
    pub ratios: RebalanceRatios,
}

/// Rebalances in time order; entry `v` is the transition `v -> v + 1`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebalanceSchedule {
    entries: Vec<ScheduledRebalance>,
}

impl RebalanceSchedule {
    pub fn new(entries: Vec<ScheduledRebalance>) -> Result<Self, LedgerError> {
        for (i, w) in entries.windows(2).enumerate() {
            if w[1].timestamp < w[0].timestamp {
                return Err(LedgerError::InvalidSchedule(format!(
                    "rebalance {} at {} precedes rebalance {} at {}",
                    i + 1,
                    w[1].timestamp,
                    i,
                    w[0].timestamp
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ScheduledRebalance] {
        &self.entries
    }

    fn entry(&self, version: u64) -> Result<&ScheduledRebalance, LedgerError> {
        self.entries
            .get(version as usize)
            .ok_or(LedgerError::UnknownRebalance { version })
    }
}

impl RebalanceSource for RebalanceSchedule {
    fn rebalance_count(&self, now: u64) -> u64 {
        self.entries
            .iter()
            .take_while(|e| e.timestamp <= now)
            .count() as u64
    }

    fn rebalance_timestamp(&self, version: u64) -> Result<u64, LedgerError> {
        Ok(self.entry(version)?.timestamp)
    }

    fn apply_rebalance(
        &self,
        amounts: TrancheAmounts,
        version: u64,
    ) -> Result<TrancheAmounts, LedgerError> {
        self.entry(version)?.ratios.apply(amounts)
    }
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Rate and relative weight in force from `from` until the next segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RateSegment {
    pub from: u64,
    pub rate: u128,
    pub relative_weight: u128,
}

/// Piecewise-constant emission schedule. Before the first segment both the
/// rate and the relative weight are zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateSchedule {
    segments: Vec<RateSegment>,
}

impl RateSchedule {
    pub fn new(segments: Vec<RateSegment>) -> Result<Self, LedgerError> {
        for w in segments.windows(2) {
            if w[1].from <= w[0].from {
                return Err(LedgerError::InvalidSchedule(format!(
                    "rate segment starting at {} does not follow {}",
                    w[1].from, w[0].from
                )));
            }
        }
        Ok(Self { segments })
    }

    /// A single segment covering all time.
    pub fn constant(rate: u128, relative_weight: u128) -> Self {
        Self {
            segments: vec![RateSegment {
                from: 0,
                rate,
                relative_weight,
            }],
        }
    }

    fn segment_at(&self, timestamp: u64) -> Option<&RateSegment> {
        let idx = self.segments.partition_point(|s| s.from <= timestamp);
        idx.checked_sub(1).map(|i| &self.segments[i])
    }
}

impl RateSource for RateSchedule {
    fn rate(&self, timestamp: u64) -> u128 {
        self.segment_at(timestamp).map(|s| s.rate).unwrap_or(0)
    }

    fn relative_weight(&self, _fund: &str, timestamp: u64) -> u128 {
        self.segment_at(timestamp)
            .map(|s| s.relative_weight)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling_m() -> RebalanceRatios {
        RebalanceRatios {
            ratio_m: 2 * UNIT,
            ..RebalanceRatios::IDENTITY
        }
    }

    #[test]
    fn ratios_fold_a_and_b_into_m() {
        let r = RebalanceRatios {
            ratio_m: UNIT,
            ratio_a2m: UNIT / 10,
            ratio_b2m: UNIT / 5,
            ratio_ab: UNIT / 2,
        };
        let out = r.apply(TrancheAmounts::new(100, 100, 100)).unwrap();
        assert_eq!(out, TrancheAmounts::new(130, 50, 50));
    }

    #[test]
    fn count_includes_rebalance_at_exact_timestamp() {
        let s = RebalanceSchedule::new(vec![
            ScheduledRebalance {
                timestamp: 5,
                ratios: doubling_m(),
            },
            ScheduledRebalance {
                timestamp: 9,
                ratios: RebalanceRatios::IDENTITY,
            },
        ])
        .unwrap();
        assert_eq!(s.rebalance_count(4), 0);
        assert_eq!(s.rebalance_count(5), 1);
        assert_eq!(s.rebalance_count(100), 2);
        assert_eq!(s.rebalance_timestamp(1), Ok(9));
        assert_eq!(
            s.rebalance_timestamp(2),
            Err(LedgerError::UnknownRebalance { version: 2 })
        );
    }

    #[test]
    fn unsorted_rebalances_rejected() {
        let err = RebalanceSchedule::new(vec![
            ScheduledRebalance {
                timestamp: 9,
                ratios: RebalanceRatios::IDENTITY,
            },
            ScheduledRebalance {
                timestamp: 5,
                ratios: RebalanceRatios::IDENTITY,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSchedule(_)));
    }

    #[test]
    fn rate_schedule_is_piecewise_constant() {
        let s = RateSchedule::new(vec![
            RateSegment {
                from: 10,
                rate: 1,
                relative_weight: UNIT,
            },
            RateSegment {
                from: 20,
                rate: 2,
                relative_weight: UNIT / 2,
            },
        ])
        .unwrap();
        assert_eq!(s.rate(9), 0);
        assert_eq!(s.rate(10), 1);
        assert_eq!(s.rate(19), 1);
        assert_eq!(s.rate(20), 2);
        assert_eq!(s.relative_weight("fund", 25), UNIT / 2);
    }
}
