//! Cross-contract surface of the leveraged vault.
//!
//! The vault and the strategy talk to each other, to the lending market and
//! to the collateral wrapping adapter only through the clients generated from
//! these traits. Mutating calls are issued with the `try_*` variants and
//! settled with [`gateway_result`] or [`forward_result`].

use soroban_sdk::{contractclient, contracttype, Address, Env, InvokeError};

use crate::constants::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::Error;

/// Bounds of the leverage and unwind loops.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoopConfig {
    /// Maximum supply/borrow (or withdraw/repay) rounds per operation.
    pub max_iterations: u32,
    /// Distance from the target ratio treated as converged, in ratio units.
    pub tolerance: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Live view of a strategy position, as read from the lending market.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PositionSnapshot {
    /// Collateral supplied to the market.
    pub supplied: i128,
    /// Outstanding debt, in debt-asset units.
    pub borrowed: i128,
    /// Outstanding debt expressed in collateral units (rounded up).
    pub debt_in_collateral: i128,
    /// Collateral held by the strategy but not supplied.
    pub idle: i128,
    /// Debt-to-collateral ratio in ratio units.
    pub ratio: u32,
}

impl PositionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.supplied == 0 && self.borrowed == 0 && self.idle == 0
    }
}

/// Outcome of a harvest.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HarvestReport {
    pub ratio_before: u32,
    pub ratio_after: u32,
    pub iterations: u32,
}

#[contractclient(name = "LendingMarketClient")]
pub trait LendingMarketInterface {
    /// Pulls `amount` of `asset` from `from` (via allowance) and credits it as collateral.
    fn supply(env: Env, from: Address, asset: Address, amount: i128) -> Result<(), Error>;
    /// Opens `amount` of debt in `asset` for `from` and sends the tokens to `from`.
    fn borrow(env: Env, from: Address, asset: Address, amount: i128) -> Result<(), Error>;
    /// Pulls `amount` of `asset` from `from` (via allowance) and reduces its debt.
    fn repay(env: Env, from: Address, asset: Address, amount: i128) -> Result<(), Error>;
    /// Releases `amount` of supplied `asset` of `from` to `to`.
    fn withdraw(
        env: Env,
        from: Address,
        asset: Address,
        amount: i128,
        to: Address,
    ) -> Result<(), Error>;
    fn supplied_balance(env: Env, account: Address, asset: Address) -> i128;
    fn borrowed_balance(env: Env, account: Address, asset: Address) -> i128;
    /// Maximum loan-to-value of `asset` used as collateral, in ratio units.
    fn max_loan_to_value(env: Env, asset: Address) -> u32;
    /// Price of `asset` scaled by `PRICE_SCALE`.
    fn price(env: Env, asset: Address) -> i128;
}

#[contractclient(name = "CollateralAdapterClient")]
pub trait CollateralAdapterInterface {
    /// Converts `amount` of base asset of `from` into collateral, returned to `from`.
    fn wrap(env: Env, from: Address, amount: i128) -> Result<i128, Error>;
    /// Converts `amount` of collateral of `from` back into base asset.
    fn unwrap(env: Env, from: Address, amount: i128) -> Result<i128, Error>;
    /// Collateral that wrapping `amount` of base asset would yield right now.
    fn preview_wrap(env: Env, amount: i128) -> Result<i128, Error>;
    /// Base asset that unwrapping `amount` of collateral would yield right now.
    fn preview_unwrap(env: Env, amount: i128) -> Result<i128, Error>;
    fn base_asset(env: Env) -> Result<Address, Error>;
    fn collateral_asset(env: Env) -> Result<Address, Error>;
    fn balance(env: Env, account: Address) -> Result<i128, Error>;
}

#[contractclient(name = "StrategyClient")]
pub trait StrategyInterface {
    fn vault(env: Env) -> Result<Address, Error>;
    fn asset(env: Env) -> Result<Address, Error>;
    fn total_assets(env: Env) -> Result<i128, Error>;
    fn preview_deposit(env: Env, amount: i128) -> Result<i128, Error>;
    fn position(env: Env) -> Result<PositionSnapshot, Error>;
    fn deposit(env: Env, caller: Address, amount: i128) -> Result<(), Error>;
    fn withdraw(env: Env, caller: Address, amount: i128, to: Address) -> Result<i128, Error>;
    fn withdraw_all(env: Env, caller: Address) -> Result<i128, Error>;
}

#[contractclient(name = "VaultClient")]
pub trait VaultInterface {
    fn owner(env: Env) -> Result<Address, Error>;
    fn asset(env: Env) -> Result<Address, Error>;
}

/// Settles a lending market or adapter call.
///
/// Market illiquidity is surfaced as such; every other failure becomes
/// [`Error::GatewayReverted`].
pub fn gateway_result<T, C>(
    result: Result<Result<T, C>, Result<Error, InvokeError>>,
) -> Result<T, Error> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Err(Ok(Error::InsufficientLiquidity)) => Err(Error::InsufficientLiquidity),
        _ => Err(Error::GatewayReverted),
    }
}

/// Settles a call between the core contracts, keeping the callee's error.
pub fn forward_result<T, C>(
    result: Result<Result<T, C>, Result<Error, InvokeError>>,
) -> Result<T, Error> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Err(Ok(error)) => Err(error),
        _ => Err(Error::GatewayReverted),
    }
}
