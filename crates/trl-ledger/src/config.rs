use serde::{Deserialize, Serialize};

use crate::LedgerError;

pub const DEFAULT_MAX_ITERATIONS: u32 = 500;
pub const DEFAULT_WEEK_SECS: u64 = 7 * 86_400;
/// Thursday 14:00 UTC, counted from the Thursday epoch (1970-01-01).
pub const DEFAULT_SETTLEMENT_SECS: u64 = 14 * 3_600;

/// Engine parameters.
///
/// Loaded from the `ledger:` section of the layered YAML config by
/// `trl-config`; every field has a default so an empty section is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Identity passed to `RateSource::relative_weight`.
    pub fund_id: String,
    /// Step budget for one global checkpoint call.
    pub max_iterations: u32,
    /// Length of a reward-rate epoch.
    pub week_secs: u64,
    /// Offset of the week boundary from the epoch, `< week_secs`.
    pub settlement_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fund_id: "fund".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            week_secs: DEFAULT_WEEK_SECS,
            settlement_secs: DEFAULT_SETTLEMENT_SECS,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.fund_id.trim().is_empty() {
            return Err(LedgerError::InvalidConfig("fund_id must not be empty".into()));
        }
        if self.max_iterations == 0 {
            return Err(LedgerError::InvalidConfig(
                "max_iterations must be > 0".into(),
            ));
        }
        if self.week_secs == 0 {
            return Err(LedgerError::InvalidConfig("week_secs must be > 0".into()));
        }
        if self.settlement_secs >= self.week_secs {
            return Err(LedgerError::InvalidConfig(format!(
                "settlement_secs {} must be < week_secs {}",
                self.settlement_secs, self.week_secs
            )));
        }
        Ok(())
    }

    /// First week boundary strictly after `t`, or `None` when it does not
    /// fit in a `u64`.
    pub fn end_of_week(&self, t: u64) -> Option<u64> {
        if t < self.settlement_secs {
            return Some(self.settlement_secs);
        }
        self.week_start(t).checked_add(self.week_secs)
    }

    /// Boundary that opened the week containing `t`; zero before the first
    /// boundary.
    pub fn week_start(&self, t: u64) -> u64 {
        if t < self.settlement_secs {
            return 0;
        }
        (t - self.settlement_secs) / self.week_secs * self.week_secs + self.settlement_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(week: u64, settlement: u64) -> LedgerConfig {
        LedgerConfig {
            week_secs: week,
            settlement_secs: settlement,
            ..LedgerConfig::default()
        }
    }

    #[test]
    fn end_of_week_is_strictly_after() {
        let c = cfg(100, 30);
        assert_eq!(c.end_of_week(0), Some(30));
        assert_eq!(c.end_of_week(29), Some(30));
        assert_eq!(c.end_of_week(30), Some(130));
        assert_eq!(c.end_of_week(129), Some(130));
    }

    #[test]
    fn end_of_week_past_u64_range_is_none() {
        let c = cfg(100, 30);
        let last = c.week_start(u64::MAX);
        assert!(u64::MAX - last < 100);
        assert_eq!(c.end_of_week(u64::MAX), None);
        assert_eq!(c.end_of_week(last - 1), Some(last));
    }

    #[test]
    fn week_start_brackets_t() {
        let c = cfg(100, 30);
        assert_eq!(c.week_start(75), 30);
        assert_eq!(c.week_start(130), 130);
        // Before the first boundary the start clamps at zero.
        assert_eq!(c.week_start(10), 0);
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(LedgerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn settlement_must_be_inside_week() {
        let err = cfg(100, 100).validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
        assert!(cfg(0, 0).validate().is_err());
    }
}
