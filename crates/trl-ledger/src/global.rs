//! Global checkpoint.
//!
//! # Purpose
//!
//! Integrates `rate · relative_weight / total_weight` from the last
//! checkpoint up to `now`, cutting time into steps at every week boundary
//! (where the rate is re-read) and every pending rebalance (where the
//! integral is archived, reset, and the total supply is transformed into the
//! next version).
//!
//! # Invariants
//!
//! - **Monotonic clock**: `checkpoint_timestamp` never decreases and never
//!   passes `now`.
//! - **Converged** means `now` was reached and no rebalance with a timestamp
//!   at or before `now` is left uncrossed.
//! - **Version/history lockstep**: after a commit,
//!   `historical_integrals.len() == total_supply_version`.
//! - **Zero-weight skip**: a step with zero total weight adds nothing to the
//!   integral; the emission of that step is simply not distributed.
//! - **Wide integral**: the integral is a 256-bit [`Integral`]; a dust-sized
//!   total weight yields a large step, never an accumulator overflow.
//! - **Bounded work**: at most `max_iterations` steps per call.  Hitting the
//!   bound is a successful partial result (`converged == false`); calling
//!   again continues from where the previous call stopped.
//! - **Stage, then commit**: [`GlobalCheckpoint::plan`] never touches the
//!   state it reads.  The caller commits the returned [`GlobalDelta`] with
//!   [`GlobalState::apply`] only when the surrounding operation succeeds.

use tracing::{debug, info, warn};
use trl_math::{checked_mul, multiply_decimal, Integral, MathError};

use crate::config::LedgerConfig;
use crate::oracle::{RateSource, RebalanceSource};
use crate::types::{GlobalCursor, GlobalState, GlobalView};
use crate::weight::reward_weight;
use crate::LedgerError;

// ---------------------------------------------------------------------------
// Outcome / delta
// ---------------------------------------------------------------------------

/// What one checkpoint call achieved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Steps executed (0 when already current).
    pub steps: u32,
    /// `true` when `checkpoint_timestamp` reached `now`.
    pub converged: bool,
    /// `checkpoint_timestamp` after the call.
    pub reached: u64,
    /// Rebalance boundaries crossed during the call.
    pub versions_crossed: u64,
}

/// A computed but uncommitted global checkpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalDelta {
    /// Cursor as it will be after commit. Façade operations adjust
    /// `total_supplies` here before committing.
    pub cursor: GlobalCursor,
    appended: Vec<Integral>,
    pub outcome: AdvanceOutcome,
}

impl GlobalDelta {
    /// Integrals this delta will append to `historical_integrals`.
    pub fn appended(&self) -> &[Integral] {
        &self.appended
    }

    /// Read view of `base` as if this delta were committed.
    pub fn view<'a>(&'a self, base: &'a GlobalState) -> GlobalView<'a> {
        GlobalView {
            cursor: &self.cursor,
            committed: base.historical_integrals(),
            pending: &self.appended,
        }
    }
}

impl GlobalState {
    /// Commit a delta produced by [`GlobalCheckpoint::plan`] against this
    /// same state.
    pub fn apply(&mut self, delta: GlobalDelta) -> AdvanceOutcome {
        let GlobalDelta {
            cursor,
            appended,
            outcome,
        } = delta;
        debug_assert_eq!(
            self.historical_integrals().len() + appended.len(),
            cursor.total_supply_version as usize,
            "historical integrals out of step with total supply version"
        );
        if outcome.versions_crossed > 0 {
            info!(
                from_version = self.total_supply_version(),
                to_version = cursor.total_supply_version,
                "rebalance boundaries crossed"
            );
        }
        if !outcome.converged {
            warn!(
                reached = outcome.reached,
                steps = outcome.steps,
                "global checkpoint stopped on iteration budget"
            );
        }
        self.cursor = cursor;
        self.append_historical(appended);
        outcome
    }
}

// ---------------------------------------------------------------------------
// Checkpoint engine
// ---------------------------------------------------------------------------

/// Advances global integral state through time.
pub struct GlobalCheckpoint<'a, R: ?Sized, P: ?Sized> {
    config: &'a LedgerConfig,
    rebalance: &'a R,
    rates: &'a P,
}

impl<'a, R, P> GlobalCheckpoint<'a, R, P>
where
    R: RebalanceSource + ?Sized,
    P: RateSource + ?Sized,
{
    pub fn new(config: &'a LedgerConfig, rebalance: &'a R, rates: &'a P) -> Self {
        Self {
            config,
            rebalance,
            rates,
        }
    }

    /// Stage and commit in one go. Idempotent: a second call with the same
    /// `now` is a no-op once the first converged.
    pub fn advance(
        &self,
        state: &mut GlobalState,
        now: u64,
        rebalance_count: u64,
    ) -> Result<AdvanceOutcome, LedgerError> {
        let delta = self.plan(state, now, rebalance_count)?;
        Ok(state.apply(delta))
    }

    /// Compute the checkpoint from `state` towards `now` without mutating it.
    pub fn plan(
        &self,
        state: &GlobalState,
        now: u64,
        rebalance_count: u64,
    ) -> Result<GlobalDelta, LedgerError> {
        let mut c = state.cursor;
        let mut appended = Vec::new();
        let mut steps = 0u32;
        let start_version = c.total_supply_version;

        let mut rebalance_ts = self.next_rebalance_timestamp(&c, rebalance_count)?;
        if c.checkpoint_timestamp >= now && rebalance_ts > now {
            return Ok(GlobalDelta {
                cursor: c,
                appended,
                outcome: AdvanceOutcome {
                    steps,
                    converged: true,
                    reached: c.checkpoint_timestamp,
                    versions_crossed: 0,
                },
            });
        }

        // `None` once the next boundary is past `u64::MAX`.
        let mut next_week = self.config.end_of_week(c.checkpoint_timestamp);
        let mut weight = reward_weight(&c.total_supplies)?;

        // A rebalance due exactly at the checkpoint still needs its own
        // zero-length step.
        while steps < self.config.max_iterations
            && (c.checkpoint_timestamp < now || rebalance_ts <= now)
        {
            let end = rebalance_ts.min(next_week.unwrap_or(u64::MAX)).min(now);
            let dt = end
                .checked_sub(c.checkpoint_timestamp)
                .ok_or(MathError::Underflow)?;

            if weight > 0 && dt > 0 {
                let emission = checked_mul(multiply_decimal(c.rate, c.relative_weight)?, dt as u128)?;
                let delta = Integral::ratio(emission, weight)?;
                c.inv_total_weight_integral = c.inv_total_weight_integral.checked_add(delta)?;
            }

            if end == rebalance_ts {
                appended.push(c.inv_total_weight_integral);
                c.inv_total_weight_integral = Integral::ZERO;
                c.total_supplies = self
                    .rebalance
                    .apply_rebalance(c.total_supplies, c.total_supply_version)?;
                c.total_supply_version += 1;
                weight = reward_weight(&c.total_supplies)?;
                rebalance_ts = self.next_rebalance_timestamp(&c, rebalance_count)?;
                debug!(
                    version = c.total_supply_version,
                    at = end,
                    weight,
                    "rebalance applied to total supplies"
                );
            }

            if next_week == Some(end) {
                c.rate = self.rates.rate(end);
                c.relative_weight = self.rates.relative_weight(&self.config.fund_id, end);
                next_week = end.checked_add(self.config.week_secs);
                debug!(week = end, rate = c.rate, relative_weight = c.relative_weight, "week rolled");
            }

            c.checkpoint_timestamp = end;
            steps += 1;
        }

        let outcome = AdvanceOutcome {
            steps,
            converged: c.checkpoint_timestamp >= now && rebalance_ts > now,
            reached: c.checkpoint_timestamp,
            versions_crossed: c.total_supply_version - start_version,
        };
        debug!(
            steps,
            reached = outcome.reached,
            now,
            integral = %c.inv_total_weight_integral,
            "global checkpoint planned"
        );
        Ok(GlobalDelta {
            cursor: c,
            appended,
            outcome,
        })
    }

    /// Timestamp of the next uncrossed rebalance, or `u64::MAX` when none is
    /// pending. Clamped to the checkpoint so a collaborator reporting a
    /// rebalance in the already-integrated past yields a zero-length step.
    fn next_rebalance_timestamp(
        &self,
        c: &GlobalCursor,
        rebalance_count: u64,
    ) -> Result<u64, LedgerError> {
        if c.total_supply_version >= rebalance_count {
            return Ok(u64::MAX);
        }
        let ts = self.rebalance.rebalance_timestamp(c.total_supply_version)?;
        Ok(ts.max(c.checkpoint_timestamp))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{
        RateSchedule, RebalanceRatios, RebalanceSchedule, ScheduledRebalance,
    };
    use crate::types::TrancheAmounts;
    use trl_math::{PRECISE_UNIT, UNIT};

    fn cfg() -> LedgerConfig {
        LedgerConfig {
            week_secs: 1_000,
            settlement_secs: 0,
            ..LedgerConfig::default()
        }
    }

    fn state_with_supply(m: u128) -> GlobalState {
        GlobalState::new(GlobalCursor {
            rate: 10 * UNIT,
            relative_weight: UNIT,
            total_supplies: TrancheAmounts::new(m, 0, 0),
            ..GlobalCursor::default()
        })
    }

    fn doubling_at(ts: u64) -> RebalanceSchedule {
        RebalanceSchedule::new(vec![ScheduledRebalance {
            timestamp: ts,
            ratios: RebalanceRatios {
                ratio_m: 2 * UNIT,
                ..RebalanceRatios::IDENTITY
            },
        }])
        .unwrap()
    }

    #[test]
    fn integrates_rate_over_weight() {
        let cfg = cfg();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(100 * UNIT);

        let out = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 5, 0)
            .unwrap();

        assert!(out.converged);
        assert_eq!(st.checkpoint_timestamp(), 5);
        // 10/s * 5s / 100 = 0.5
        assert_eq!(st.cursor.inv_total_weight_integral, Integral::from(PRECISE_UNIT / 2));
    }

    #[test]
    fn already_current_is_noop() {
        let cfg = cfg();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(100 * UNIT);
        st.cursor.checkpoint_timestamp = 50;
        let before = st.clone();

        let out = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 40, 0)
            .unwrap();

        assert_eq!(out.steps, 0);
        assert!(out.converged);
        assert_eq!(st, before);
    }

    #[test]
    fn rebalance_archives_and_resets_integral() {
        let cfg = cfg();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = doubling_at(5);
        let mut st = state_with_supply(100 * UNIT);

        let out = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 10, 1)
            .unwrap();

        assert_eq!(out.versions_crossed, 1);
        assert_eq!(st.total_supply_version(), 1);
        assert_eq!(st.historical_integrals(), &[Integral::from(PRECISE_UNIT / 2)]);
        assert_eq!(st.cursor.total_supplies.m, 200 * UNIT);
        // 10/s * 5s / 200 = 0.25 in the new version
        assert_eq!(st.cursor.inv_total_weight_integral, Integral::from(PRECISE_UNIT / 4));
    }

    #[test]
    fn rebalance_due_at_checkpoint_is_still_crossed() {
        let cfg = cfg();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = doubling_at(5);
        let mut st = state_with_supply(100 * UNIT);
        st.cursor.checkpoint_timestamp = 5;

        let out = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 5, 1)
            .unwrap();

        assert!(out.converged);
        assert_eq!(out.steps, 1);
        assert_eq!(st.total_supply_version(), 1);
        assert_eq!(st.historical_integrals(), &[Integral::ZERO]);
        assert_eq!(st.checkpoint_timestamp(), 5);
    }

    #[test]
    fn zero_weight_window_adds_nothing() {
        let cfg = cfg();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(0);

        let out = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 3_500, 0)
            .unwrap();

        assert!(out.converged);
        assert_eq!(st.cursor.inv_total_weight_integral, Integral::ZERO);
        assert_eq!(st.checkpoint_timestamp(), 3_500);
    }

    #[test]
    fn iteration_budget_yields_partial_progress() {
        let cfg = LedgerConfig {
            max_iterations: 2,
            ..cfg()
        };
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(100 * UNIT);
        let cp = GlobalCheckpoint::new(&cfg, &rb, &rates);

        // Week boundaries at 1000, 2000, 3000: four steps to reach 3500.
        let first = cp.advance(&mut st, 3_500, 0).unwrap();
        assert!(!first.converged);
        assert_eq!(first.reached, 2_000);

        let second = cp.advance(&mut st, 3_500, 0).unwrap();
        assert!(second.converged);
        assert_eq!(second.reached, 3_500);
        // 10/s * 3500s / 100 = 350
        assert_eq!(st.cursor.inv_total_weight_integral, Integral::from(350 * PRECISE_UNIT));
    }

    #[test]
    fn week_boundary_refreshes_rate() {
        let cfg = cfg();
        let rates = crate::schedule::RateSchedule::new(vec![
            crate::schedule::RateSegment {
                from: 0,
                rate: 10 * UNIT,
                relative_weight: UNIT,
            },
            crate::schedule::RateSegment {
                from: 1_000,
                rate: 20 * UNIT,
                relative_weight: UNIT / 2,
            },
        ])
        .unwrap();
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(100 * UNIT);

        GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 1_100, 0)
            .unwrap();

        assert_eq!(st.cursor.rate, 20 * UNIT);
        assert_eq!(st.cursor.relative_weight, UNIT / 2);
        // 1000s at 10/s + 100s at 20/s * 0.5, over weight 100
        assert_eq!(st.cursor.inv_total_weight_integral, Integral::from(110 * PRECISE_UNIT));
    }

    #[test]
    fn plan_does_not_mutate() {
        let cfg = cfg();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = doubling_at(5);
        let st = state_with_supply(100 * UNIT);

        let delta = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .plan(&st, 10, 1)
            .unwrap();

        assert_eq!(delta.appended(), &[Integral::from(PRECISE_UNIT / 2)]);
        assert_eq!(st.total_supply_version(), 0);
        assert_eq!(st.checkpoint_timestamp(), 0);
        let view = delta.view(&st);
        assert_eq!(view.historical_integral(0), Ok(Integral::from(PRECISE_UNIT / 2)));
    }

    #[test]
    fn emission_overflow_fails_instead_of_wrapping() {
        let cfg = cfg();
        let rates = RateSchedule::constant(u128::MAX / 2, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(1);
        st.cursor.rate = u128::MAX / 2;
        let before = st.clone();

        // rate * dt no longer fits in u128.
        let err = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, 10, 0)
            .unwrap_err();

        assert!(matches!(err, LedgerError::Arithmetic(_)));
        assert_eq!(st, before);
    }

    #[test]
    fn dust_weight_integral_grows_past_u128() {
        let cfg = LedgerConfig::default();
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(1);
        let cp = GlobalCheckpoint::new(&cfg, &rb, &rates);

        cp.advance(&mut st, 604_800, 0).unwrap();
        let after_week = st.cursor.inv_total_weight_integral;
        assert!(after_week > Integral::from(u128::MAX));

        let out = cp.advance(&mut st, 3 * 604_800, 0).unwrap();
        assert!(out.converged);
        assert!(st.cursor.inv_total_weight_integral > after_week);
    }

    #[test]
    fn checkpoint_near_end_of_time_does_not_underflow() {
        let cfg = LedgerConfig {
            week_secs: 100,
            settlement_secs: 30,
            ..LedgerConfig::default()
        };
        let rates = RateSchedule::constant(10 * UNIT, UNIT);
        let rb = RebalanceSchedule::empty();
        let mut st = state_with_supply(100 * UNIT);
        // Last representable boundary is u64::MAX - 85.
        st.cursor.checkpoint_timestamp = u64::MAX - 100;

        let out = GlobalCheckpoint::new(&cfg, &rb, &rates)
            .advance(&mut st, u64::MAX, 0)
            .unwrap();

        assert!(out.converged);
        assert_eq!(out.steps, 2);
        assert_eq!(st.checkpoint_timestamp(), u64::MAX);
    }
}
