//! Leverage and unwind loops.
//!
//! The [`Engine`] never remembers supplied or borrowed amounts between steps:
//! every iteration starts from a fresh [`Position`] read from the lending
//! market, so a step that fails or an interest accrual between calls cannot
//! desynchronize it from the market's books.
//!
//! Collateral is valued at what it would fetch on an exit: the debt is
//! priced at the collateral the adapter asks to unwrap into enough base
//! asset to repay it, so conversion spreads are charged to the position
//! rather than to whoever withdraws last.

use leverage_common::{
    constants::{APPROVAL_LEDGERS, SAFETY_MARGIN},
    interfaces::gateway_result,
    math::{checked_add, checked_sub, mul_div_ceil},
    CollateralAdapterClient, Error, LendingMarketClient, LoopConfig,
};
use soroban_sdk::{log, token, Address, Env};

use crate::position::Position;

/// Refinements of an unwrap quote before the adapter is considered broken.
const QUOTE_ROUNDS: u32 = 8;

pub struct Engine<'a> {
    env: Env,
    this: Address,
    collateral: Address,
    debt_asset: Address,
    market: LendingMarketClient<'a>,
    adapter: CollateralAdapterClient<'a>,
    target: u32,
    config: LoopConfig,
}

impl<'a> Engine<'a> {
    pub fn new(
        env: &Env,
        market: &Address,
        adapter: &Address,
        collateral: Address,
        debt_asset: Address,
        target: u32,
        config: LoopConfig,
    ) -> Self {
        Self {
            env: env.clone(),
            this: env.current_contract_address(),
            collateral,
            debt_asset,
            market: LendingMarketClient::new(env, market),
            adapter: CollateralAdapterClient::new(env, adapter),
            target,
            config,
        }
    }

    pub fn position(&self) -> Result<Position, Error> {
        Position::new(
            self.market.supplied_balance(&self.this, &self.collateral),
            self.market.borrowed_balance(&self.this, &self.debt_asset),
            token::Client::new(&self.env, &self.collateral).balance(&self.this),
            self.market.price(&self.collateral),
            self.market.price(&self.debt_asset),
        )
    }

    /// Highest ratio the strategy will hold: the market's maximum
    /// loan-to-value minus `SAFETY_MARGIN`.
    pub fn ceiling(&self) -> u32 {
        self.market
            .max_loan_to_value(&self.collateral)
            .saturating_sub(SAFETY_MARGIN)
    }

    pub fn supply_idle(&self) -> Result<i128, Error> {
        let idle = token::Client::new(&self.env, &self.collateral).balance(&self.this);
        if idle > 0 {
            self.supply(idle)?;
        }
        Ok(idle)
    }

    /// Borrows against supplied collateral, wraps the proceeds and resupplies
    /// them until the ratio is within tolerance below the target.
    ///
    /// Each round borrows exactly what the current collateral supports at the
    /// target, so the ratio approaches the target from below and the step
    /// shrinks by a factor of roughly `target` per round.
    pub fn lever(&self) -> Result<u32, Error> {
        let ceiling = self.ceiling();
        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            let position = self.position()?;
            let Some((amount, _)) = self.next_borrow(&position, ceiling)? else {
                break;
            };

            self.borrow(amount)?;
            let wrapped = self.wrap(amount)?;
            self.supply(wrapped)?;
            iterations += 1;
            log!(&self.env, "lever", iterations, amount, wrapped);
        }
        Ok(iterations)
    }

    /// Net collateral the position gains if `amount` is deposited and levered
    /// now, costs of wrapping the borrowed asset included.
    pub fn preview_deposit(&self, amount: i128) -> Result<i128, Error> {
        let ceiling = self.ceiling();
        let current = self.position()?;
        let before = self.net_assets(&current)?;

        let supplied = checked_add(checked_add(current.supplied, current.idle)?, amount)?;
        let mut simulated = current.with_balances(supplied, current.borrowed, 0)?;
        for _ in 0..self.config.max_iterations {
            let Some((borrowed, wrapped)) = self.next_borrow(&simulated, ceiling)? else {
                break;
            };
            simulated = simulated.with_balances(
                checked_add(simulated.supplied, wrapped)?,
                checked_add(simulated.borrowed, borrowed)?,
                0,
            )?;
        }
        Ok((self.net_assets(&simulated)? - before).max(0))
    }

    /// The next lever round: the debt to borrow and the collateral it wraps
    /// into, or `None` once the position is within tolerance of the target
    /// or the market ceiling leaves no room.
    fn next_borrow(
        &self,
        position: &Position,
        ceiling: u32,
    ) -> Result<Option<(i128, i128)>, Error> {
        if position.supplied == 0
            || position.ratio().saturating_add(self.config.tolerance) >= self.target
        {
            return Ok(None);
        }
        let room = position.borrow_room(self.target, ceiling)?;
        let amount = position.to_debt_units(room)?;
        if amount == 0 {
            return Ok(None);
        }
        let wrapped = self.preview_wrap(amount)?;
        if wrapped == 0 {
            return Ok(None);
        }
        Ok(Some((amount, wrapped)))
    }

    /// Collateral owned by the strategy once every unit of debt is repaid
    /// through the adapter, never negative.
    pub fn net_assets(&self, position: &Position) -> Result<i128, Error> {
        let gross = checked_add(position.supplied, position.idle)?;
        let owed = self.collateral_for(position, position.borrowed)?;
        Ok(checked_sub(gross, owed)?.max(0))
    }

    pub fn total_assets(&self) -> Result<i128, Error> {
        self.net_assets(&self.position()?)
    }

    /// Smallest amount of collateral the adapter unwraps into at least
    /// `base` of the debt asset.
    fn collateral_for(&self, position: &Position, base: i128) -> Result<i128, Error> {
        if base <= 0 {
            return Ok(0);
        }
        let mut amount =
            mul_div_ceil(base, position.debt_price, position.collateral_price)?.max(1);
        for _ in 0..QUOTE_ROUNDS {
            let quoted = self.preview_unwrap(amount)?;
            if quoted >= base {
                return Ok(amount);
            }
            amount = if quoted == 0 {
                amount.checked_mul(2).ok_or(Error::MathOverflow)?
            } else {
                mul_div_ceil(amount, base, quoted)?.max(amount + 1)
            };
        }
        Err(Error::GatewayReverted)
    }

    /// Repays debt until the ratio is back within tolerance above the target.
    pub fn deleverage(&self) -> Result<u32, Error> {
        let ceiling = self.ceiling();
        let bound = self.target.saturating_add(self.config.tolerance);
        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            let position = self.position()?;
            if position.ratio() <= bound {
                break;
            }
            let need = position.repay_need(self.target, 0)?;
            if !self.unwind_step(&position, need, ceiling)? {
                if iterations == 0 {
                    return Err(Error::RatioBoundExceeded);
                }
                break;
            }
            iterations += 1;
        }
        Ok(iterations)
    }

    /// Unwinds enough leverage to pay out `amount` of collateral, withdraws
    /// it from the market and sends it to `to`. Returns the amount paid.
    ///
    /// The equity left behind is valued at exit prices, so a withdrawal of
    /// everything clears the debt and one of less leaves the rest at the
    /// target.
    pub fn release(&self, amount: i128, to: &Address) -> Result<i128, Error> {
        if amount > self.total_assets()? {
            return Err(Error::InsufficientLiquidity);
        }

        let ceiling = self.ceiling();
        let bound = self.target.saturating_add(self.config.tolerance);
        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            let position = self.position()?;
            if position.ratio_after_within(amount, bound) {
                break;
            }
            let left = self.net_assets(&position)? - amount;
            let need = position.repay_to_target(self.target, left)?;
            if need == 0 || !self.unwind_step(&position, need, ceiling)? {
                break;
            }
            iterations += 1;
        }

        let position = self.position()?;
        if amount > position.supplied + position.idle {
            return Err(Error::InsufficientLiquidity);
        }
        let from_market = position.from_market(amount);
        if from_market > 0 {
            if !position.ratio_after_within(amount, ceiling) {
                return Err(Error::InsufficientLiquidity);
            }
            self.withdraw_to(from_market, &self.this)?;
        }
        token::Client::new(&self.env, &self.collateral).transfer(&self.this, to, &amount);
        log!(&self.env, "release", amount, iterations);
        Ok(amount)
    }

    /// Repays all debt and withdraws all collateral into the strategy.
    /// Returns the collateral held afterwards.
    pub fn exit(&self) -> Result<i128, Error> {
        let ceiling = self.ceiling();
        let mut iterations = 0;
        loop {
            let position = self.position()?;
            if position.borrowed == 0 {
                break;
            }
            if iterations >= self.config.max_iterations
                || !self.unwind_step(&position, position.debt_in_collateral, ceiling)?
            {
                return Err(Error::InsufficientLiquidity);
            }
            iterations += 1;
        }

        let position = self.position()?;
        if position.supplied > 0 {
            self.withdraw_to(position.supplied, &self.this)?;
        }
        Ok(token::Client::new(&self.env, &self.collateral).balance(&self.this))
    }

    /// Repays the debt worth `need` collateral at market prices, or all of it
    /// when `need` covers the whole debt. Withdraws the collateral the
    /// adapter asks for (bounded by the ceiling), unwraps it and repays with
    /// the proceeds; any excess is wrapped back. Returns false when the
    /// market leaves no room to withdraw.
    fn unwind_step(&self, position: &Position, need: i128, ceiling: u32) -> Result<bool, Error> {
        let repay = if need >= position.debt_in_collateral {
            position.borrowed
        } else {
            position.to_debt_units(need)?.max(1).min(position.borrowed)
        };
        let step = self
            .collateral_for(position, repay)?
            .min(position.withdraw_room(ceiling)?)
            .min(position.supplied);
        if step <= 0 || self.preview_unwrap(step)? == 0 {
            return Ok(false);
        }

        self.withdraw_to(step, &self.this)?;
        let base = self.unwrap(step)?;
        let repaid = base.min(position.borrowed);
        if repaid > 0 {
            self.repay(repaid)?;
        }
        if base > repaid {
            self.rewrap(base - repaid)?;
        }
        log!(&self.env, "unwind", step, repaid);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // gateway calls
    // ------------------------------------------------------------------

    fn approve(&self, asset: &Address, spender: &Address, amount: i128) {
        let live_until = self.env.ledger().sequence() + APPROVAL_LEDGERS;
        token::Client::new(&self.env, asset).approve(&self.this, spender, &amount, &live_until);
    }

    fn supply(&self, amount: i128) -> Result<(), Error> {
        self.approve(&self.collateral, &self.market.address, amount);
        gateway_result(self.market.try_supply(&self.this, &self.collateral, &amount))
    }

    fn borrow(&self, amount: i128) -> Result<(), Error> {
        gateway_result(self.market.try_borrow(&self.this, &self.debt_asset, &amount))
    }

    fn repay(&self, amount: i128) -> Result<(), Error> {
        self.approve(&self.debt_asset, &self.market.address, amount);
        gateway_result(self.market.try_repay(&self.this, &self.debt_asset, &amount))
    }

    fn withdraw_to(&self, amount: i128, to: &Address) -> Result<(), Error> {
        gateway_result(
            self.market
                .try_withdraw(&self.this, &self.collateral, &amount, to),
        )
    }

    fn wrap(&self, amount: i128) -> Result<i128, Error> {
        self.approve(&self.debt_asset, &self.adapter.address, amount);
        gateway_result(self.adapter.try_wrap(&self.this, &amount))
    }

    fn preview_wrap(&self, amount: i128) -> Result<i128, Error> {
        gateway_result(self.adapter.try_preview_wrap(&amount))
    }

    fn preview_unwrap(&self, amount: i128) -> Result<i128, Error> {
        gateway_result(self.adapter.try_preview_unwrap(&amount))
    }

    fn unwrap(&self, amount: i128) -> Result<i128, Error> {
        self.approve(&self.collateral, &self.adapter.address, amount);
        gateway_result(self.adapter.try_unwrap(&self.this, &amount))
    }

    /// Wraps base asset left over after a repayment; amounts too small to
    /// produce any collateral stay as base asset.
    fn rewrap(&self, amount: i128) -> Result<(), Error> {
        self.approve(&self.debt_asset, &self.adapter.address, amount);
        match self.adapter.try_wrap(&self.this, &amount) {
            Err(Ok(Error::ZeroAmount)) => Ok(()),
            other => gateway_result(other).map(|_| ()),
        }
    }
}
