use core::fmt::Debug;

use leverage_common::{constants::PRICE_SCALE, math::mul_div_floor, Error};
use soroban_sdk::{contract, contractimpl, contracttype, token, Address, Env, TryFromVal, Val};

const SPREAD_SCALE: i128 = 10_000;

#[contracttype]
pub enum DataKey {
    Base,
    Collateral,
    /// Collateral minted per unit of base asset, scaled by `PRICE_SCALE`.
    Rate,
    /// Conversion spread in basis points, charged in both directions.
    Spread,
}

/// Wrapping adapter; must be the admin of the collateral token.
#[contract]
pub struct MockCollateralAdapter;

#[contractimpl]
impl MockCollateralAdapter {
    pub fn initialize(
        env: Env,
        base: Address,
        collateral: Address,
        rate: i128,
        spread_bps: u32,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Base) {
            return Err(Error::AlreadyInitialized);
        }
        if rate <= 0 || spread_bps as i128 >= SPREAD_SCALE {
            return Err(Error::InvalidConfig);
        }
        env.storage().instance().set(&DataKey::Base, &base);
        env.storage().instance().set(&DataKey::Collateral, &collateral);
        env.storage().instance().set(&DataKey::Rate, &rate);
        env.storage().instance().set(&DataKey::Spread, &spread_bps);
        Ok(())
    }

    pub fn wrap(env: Env, from: Address, amount: i128) -> Result<i128, Error> {
        from.require_auth();
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        let out = Self::preview_wrap(env.clone(), amount)?;
        if out == 0 {
            return Err(Error::ZeroAmount);
        }

        let adapter = env.current_contract_address();
        token::Client::new(&env, &Self::base_asset(env.clone())?)
            .transfer_from(&adapter, &from, &adapter, &amount);
        token::StellarAssetClient::new(&env, &Self::collateral_asset(env.clone())?)
            .mint(&from, &out);
        Ok(out)
    }

    pub fn unwrap(env: Env, from: Address, amount: i128) -> Result<i128, Error> {
        from.require_auth();
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        let out = Self::preview_unwrap(env.clone(), amount)?;
        if out == 0 {
            return Err(Error::ZeroAmount);
        }

        let adapter = env.current_contract_address();
        let base = token::Client::new(&env, &Self::base_asset(env.clone())?);
        if base.balance(&adapter) < out {
            return Err(Error::InsufficientLiquidity);
        }
        let collateral = token::Client::new(&env, &Self::collateral_asset(env.clone())?);
        collateral.transfer_from(&adapter, &from, &adapter, &amount);
        collateral.burn(&adapter, &amount);
        base.transfer(&adapter, &from, &out);
        Ok(out)
    }

    pub fn preview_wrap(env: Env, amount: i128) -> Result<i128, Error> {
        if amount <= 0 {
            return Ok(0);
        }
        let gross = mul_div_floor(amount, Self::read(&env, DataKey::Rate)?, PRICE_SCALE)?;
        Self::less_spread(&env, gross)
    }

    pub fn preview_unwrap(env: Env, amount: i128) -> Result<i128, Error> {
        if amount <= 0 {
            return Ok(0);
        }
        let gross = mul_div_floor(amount, PRICE_SCALE, Self::read(&env, DataKey::Rate)?)?;
        Self::less_spread(&env, gross)
    }

    pub fn base_asset(env: Env) -> Result<Address, Error> {
        Self::read(&env, DataKey::Base)
    }

    pub fn collateral_asset(env: Env) -> Result<Address, Error> {
        Self::read(&env, DataKey::Collateral)
    }

    pub fn balance(env: Env, account: Address) -> Result<i128, Error> {
        let collateral = Self::collateral_asset(env.clone())?;
        Ok(token::Client::new(&env, &collateral).balance(&account))
    }

    fn read<V>(env: &Env, key: DataKey) -> Result<V, Error>
    where
        V: TryFromVal<Env, Val>,
        V::Error: Debug,
    {
        env.storage().instance().get(&key).ok_or(Error::NotInitialized)
    }

    fn less_spread(env: &Env, gross: i128) -> Result<i128, Error> {
        let spread: u32 = Self::read(env, DataKey::Spread)?;
        mul_div_floor(gross, SPREAD_SCALE - spread as i128, SPREAD_SCALE)
    }
}
