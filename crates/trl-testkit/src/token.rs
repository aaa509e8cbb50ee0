//! Deterministic reward sinks.

use serde::{Deserialize, Serialize};
use trl_ledger::{AccountId, LedgerError, RewardToken};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub account: AccountId,
    pub amount: u128,
}

/// Accepts every mint and remembers it in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingRewardToken {
    mints: Vec<MintRecord>,
}

impl RecordingRewardToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mints(&self) -> &[MintRecord] {
        &self.mints
    }

    pub fn total_minted(&self) -> u128 {
        self.mints.iter().map(|m| m.amount).sum()
    }

    pub fn minted_to(&self, account: &AccountId) -> u128 {
        self.mints
            .iter()
            .filter(|m| &m.account == account)
            .map(|m| m.amount)
            .sum()
    }
}

impl RewardToken for RecordingRewardToken {
    fn mint(&mut self, account: &AccountId, amount: u128) -> Result<(), LedgerError> {
        self.mints.push(MintRecord {
            account: account.clone(),
            amount,
        });
        Ok(())
    }
}

/// Refuses every mint; drives the claim rollback path.
#[derive(Clone, Debug)]
pub struct FailingRewardToken {
    reason: String,
}

impl FailingRewardToken {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RewardToken for FailingRewardToken {
    fn mint(&mut self, _account: &AccountId, _amount: u128) -> Result<(), LedgerError> {
        Err(LedgerError::RewardMint(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_token_sums_per_account() {
        let mut t = RecordingRewardToken::new();
        let a = AccountId::from("a");
        let b = AccountId::from("b");
        t.mint(&a, 3).unwrap();
        t.mint(&b, 4).unwrap();
        t.mint(&a, 5).unwrap();
        assert_eq!(t.minted_to(&a), 8);
        assert_eq!(t.total_minted(), 12);
        assert_eq!(t.mints().len(), 3);
    }

    #[test]
    fn failing_token_reports_reason() {
        let mut t = FailingRewardToken::new("paused");
        assert_eq!(
            t.mint(&AccountId::from("a"), 1),
            Err(LedgerError::RewardMint("paused".into()))
        );
    }
}
