//! Arithmetic on a leveraged position.
//!
//! A [`Position`] is a snapshot of what the lending market reports for the
//! strategy. Debt is carried in debt-asset units and, for every ratio
//! computation, converted into collateral units at market prices, rounded
//! up. Ratios are in `RATIO_SCALE` units and use supplied collateral only.

use leverage_common::{
    constants::RATIO_SCALE,
    math::{checked_add, checked_sub, mul_div_ceil, mul_div_floor},
    Error, PositionSnapshot,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Position {
    pub supplied: i128,
    pub borrowed: i128,
    pub debt_in_collateral: i128,
    pub idle: i128,
    pub collateral_price: i128,
    pub debt_price: i128,
}

impl Position {
    pub fn new(
        supplied: i128,
        borrowed: i128,
        idle: i128,
        collateral_price: i128,
        debt_price: i128,
    ) -> Result<Self, Error> {
        if collateral_price <= 0 || debt_price <= 0 {
            return Err(Error::GatewayReverted);
        }
        Ok(Self {
            supplied,
            borrowed,
            debt_in_collateral: mul_div_ceil(borrowed, debt_price, collateral_price)?,
            idle,
            collateral_price,
            debt_price,
        })
    }

    /// The same prices with different balances.
    pub fn with_balances(&self, supplied: i128, borrowed: i128, idle: i128) -> Result<Self, Error> {
        Self::new(supplied, borrowed, idle, self.collateral_price, self.debt_price)
    }

    pub fn ratio(&self) -> u32 {
        Self::ratio_of(self.debt_in_collateral, self.supplied)
    }

    fn ratio_of(debt: i128, collateral: i128) -> u32 {
        if debt <= 0 {
            return 0;
        }
        if collateral <= 0 {
            return u32::MAX;
        }
        mul_div_floor(debt, RATIO_SCALE as i128, collateral)
            .map(|ratio| ratio.min(u32::MAX as i128) as u32)
            .unwrap_or(u32::MAX)
    }

    /// Debt, in collateral units, that can still be opened without passing
    /// `target` or `ceiling` on the current supplied collateral.
    pub fn borrow_room(&self, target: u32, ceiling: u32) -> Result<i128, Error> {
        let goal = mul_div_floor(self.supplied, target.min(ceiling) as i128, RATIO_SCALE as i128)?;
        Ok((goal - self.debt_in_collateral).max(0))
    }

    /// Converts collateral units into debt-asset units, rounded down.
    pub fn to_debt_units(&self, collateral: i128) -> Result<i128, Error> {
        mul_div_floor(collateral, self.collateral_price, self.debt_price)
    }

    /// Debt, in collateral units, to repay so that the equity left after
    /// `outgoing` leaves the position sits at `target`.
    pub fn repay_need(&self, target: u32, outgoing: i128) -> Result<i128, Error> {
        let gross = checked_add(self.supplied, self.idle)?;
        let equity = checked_sub(checked_sub(gross, self.debt_in_collateral)?, outgoing)?;
        self.repay_to_target(target, equity)
    }

    /// Debt, in collateral units, to repay so that `equity` carries the
    /// position at `target`. No equity left means all of the debt.
    pub fn repay_to_target(&self, target: u32, equity: i128) -> Result<i128, Error> {
        if equity <= 0 {
            return Ok(self.debt_in_collateral);
        }
        let target = target.min(RATIO_SCALE - 1);
        let target_debt = mul_div_floor(equity, target as i128, (RATIO_SCALE - target) as i128)?;
        Ok((self.debt_in_collateral - target_debt).max(0))
    }

    /// Supplied collateral that can leave the market while the ratio stays
    /// at or below `ceiling`.
    pub fn withdraw_room(&self, ceiling: u32) -> Result<i128, Error> {
        if self.debt_in_collateral == 0 {
            return Ok(self.supplied);
        }
        if ceiling == 0 {
            return Ok(0);
        }
        let locked = mul_div_ceil(self.debt_in_collateral, RATIO_SCALE as i128, ceiling as i128)?;
        Ok((self.supplied - locked).max(0))
    }

    /// Supplied collateral that must leave the market to pay `outgoing`,
    /// idle collateral being spent first.
    pub fn from_market(&self, outgoing: i128) -> i128 {
        (outgoing - self.idle).max(0)
    }

    /// Whether paying `outgoing` keeps the ratio at or below `bound`.
    pub fn ratio_after_within(&self, outgoing: i128, bound: u32) -> bool {
        let remaining = self.supplied - self.from_market(outgoing);
        Self::ratio_of(self.debt_in_collateral, remaining) <= bound
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            supplied: self.supplied,
            borrowed: self.borrowed,
            debt_in_collateral: self.debt_in_collateral,
            idle: self.idle,
            ratio: self.ratio(),
        }
    }
}
