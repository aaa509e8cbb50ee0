use trl_math::{checked_add, checked_mul, MathError};

use crate::types::TrancheAmounts;

pub const REWARD_WEIGHT_M: u128 = 3;
pub const REWARD_WEIGHT_A: u128 = 4;
pub const REWARD_WEIGHT_B: u128 = 2;

/// Reward weight of a balance, in units of tranche M:
/// `(M·3 + A·4 + B·2) / 3`, rounded down.
///
/// The global and per-account checkpoints both go through this function, so
/// an account's share of the integral is computed with the same rounding as
/// the total it was divided by.
pub fn reward_weight(amounts: &TrancheAmounts) -> Result<u128, MathError> {
    let weighted = checked_add(
        checked_add(
            checked_mul(amounts.m, REWARD_WEIGHT_M)?,
            checked_mul(amounts.a, REWARD_WEIGHT_A)?,
        )?,
        checked_mul(amounts.b, REWARD_WEIGHT_B)?,
    )?;
    Ok(weighted / REWARD_WEIGHT_M)
}
