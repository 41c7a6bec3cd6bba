use leverage_common::{
    constants::{PRICE_SCALE, RATIO_SCALE},
    math::{checked_add, checked_sub, mul_div_ceil, mul_div_floor},
    Error,
};
use soroban_sdk::{
    contract, contractimpl, contracttype, panic_with_error, token, Address, Env, Vec,
};

#[contracttype]
pub enum DataKey {
    Admin,
    Assets,
    Price(Address),
    MaxLtv(Address),
    /// Market liquidity of an asset that is lent out and cannot leave the pool.
    Reserved(Address),
    Supplied(Address, Address),
    Borrowed(Address, Address),
}

#[contract]
pub struct MockLendingMarket;

#[contractimpl]
impl MockLendingMarket {
    pub fn initialize(env: Env, admin: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Assets, &Vec::<Address>::new(&env));
        Ok(())
    }

    // ------------------------------------------------------------------
    // admin knobs
    // ------------------------------------------------------------------

    /// Lists `asset` (or updates its parameters).
    pub fn set_asset(env: Env, asset: Address, price: i128, max_ltv: u32) -> Result<(), Error> {
        Self::require_admin(&env)?;
        if price <= 0 || max_ltv >= RATIO_SCALE {
            return Err(Error::InvalidConfig);
        }
        let mut assets = Self::assets(&env);
        if !assets.contains(&asset) {
            assets.push_back(asset.clone());
            env.storage().instance().set(&DataKey::Assets, &assets);
        }
        env.storage().instance().set(&DataKey::Price(asset.clone()), &price);
        env.storage().instance().set(&DataKey::MaxLtv(asset), &max_ltv);
        Ok(())
    }

    pub fn set_price(env: Env, asset: Address, price: i128) -> Result<(), Error> {
        Self::require_admin(&env)?;
        Self::require_listed(&env, &asset)?;
        if price <= 0 {
            return Err(Error::InvalidConfig);
        }
        env.storage().instance().set(&DataKey::Price(asset), &price);
        Ok(())
    }

    pub fn set_reserved(env: Env, asset: Address, amount: i128) -> Result<(), Error> {
        Self::require_admin(&env)?;
        env.storage().instance().set(&DataKey::Reserved(asset), &amount);
        Ok(())
    }

    /// Adds `amount` of interest to the debt of `account`.
    pub fn accrue_interest(
        env: Env,
        account: Address,
        asset: Address,
        amount: i128,
    ) -> Result<(), Error> {
        Self::require_admin(&env)?;
        let key = DataKey::Borrowed(account, asset);
        let borrowed = Self::read(&env, &key);
        env.storage().persistent().set(&key, &checked_add(borrowed, amount)?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // lending surface
    // ------------------------------------------------------------------

    pub fn supply(env: Env, from: Address, asset: Address, amount: i128) -> Result<(), Error> {
        from.require_auth();
        Self::require_listed(&env, &asset)?;
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }

        let market = env.current_contract_address();
        token::Client::new(&env, &asset).transfer_from(&market, &from, &market, &amount);

        let key = DataKey::Supplied(from, asset);
        let supplied = Self::read(&env, &key);
        env.storage().persistent().set(&key, &checked_add(supplied, amount)?);
        Ok(())
    }

    pub fn borrow(env: Env, from: Address, asset: Address, amount: i128) -> Result<(), Error> {
        from.require_auth();
        Self::require_listed(&env, &asset)?;
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        Self::require_available(&env, &asset, amount)?;

        let key = DataKey::Borrowed(from.clone(), asset.clone());
        let borrowed = Self::read(&env, &key);
        env.storage().persistent().set(&key, &checked_add(borrowed, amount)?);
        Self::require_healthy(&env, &from)?;

        let market = env.current_contract_address();
        token::Client::new(&env, &asset).transfer(&market, &from, &amount);
        Ok(())
    }

    /// Repays at most the outstanding debt.
    pub fn repay(env: Env, from: Address, asset: Address, amount: i128) -> Result<(), Error> {
        from.require_auth();
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        let key = DataKey::Borrowed(from.clone(), asset.clone());
        let borrowed = Self::read(&env, &key);
        let amount = amount.min(borrowed);
        if amount == 0 {
            return Ok(());
        }

        let market = env.current_contract_address();
        token::Client::new(&env, &asset).transfer_from(&market, &from, &market, &amount);
        env.storage().persistent().set(&key, &checked_sub(borrowed, amount)?);
        Ok(())
    }

    pub fn withdraw(
        env: Env,
        from: Address,
        asset: Address,
        amount: i128,
        to: Address,
    ) -> Result<(), Error> {
        from.require_auth();
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        let key = DataKey::Supplied(from.clone(), asset.clone());
        let supplied = Self::read(&env, &key);
        if supplied < amount {
            return Err(Error::InsufficientShares);
        }
        Self::require_available(&env, &asset, amount)?;

        env.storage().persistent().set(&key, &(supplied - amount));
        Self::require_healthy(&env, &from)?;

        let market = env.current_contract_address();
        token::Client::new(&env, &asset).transfer(&market, &to, &amount);
        Ok(())
    }

    pub fn supplied_balance(env: Env, account: Address, asset: Address) -> i128 {
        Self::read(&env, &DataKey::Supplied(account, asset))
    }

    pub fn borrowed_balance(env: Env, account: Address, asset: Address) -> i128 {
        Self::read(&env, &DataKey::Borrowed(account, asset))
    }

    pub fn max_loan_to_value(env: Env, asset: Address) -> u32 {
        env.storage()
            .instance()
            .get(&DataKey::MaxLtv(asset))
            .unwrap_or(0)
    }

    pub fn price(env: Env, asset: Address) -> i128 {
        match env.storage().instance().get(&DataKey::Price(asset)) {
            Some(price) => price,
            None => panic_with_error!(&env, Error::GatewayReverted),
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn require_admin(env: &Env) -> Result<(), Error> {
        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)?;
        admin.require_auth();
        Ok(())
    }

    fn assets(env: &Env) -> Vec<Address> {
        env.storage()
            .instance()
            .get(&DataKey::Assets)
            .unwrap_or(Vec::new(env))
    }

    fn require_listed(env: &Env, asset: &Address) -> Result<(), Error> {
        if Self::assets(env).contains(asset) {
            Ok(())
        } else {
            Err(Error::AssetMismatch)
        }
    }

    fn read(env: &Env, key: &DataKey) -> i128 {
        env.storage().persistent().get(key).unwrap_or(0)
    }

    fn require_available(env: &Env, asset: &Address, amount: i128) -> Result<(), Error> {
        let held = token::Client::new(env, asset).balance(&env.current_contract_address());
        let reserved: i128 = env
            .storage()
            .instance()
            .get(&DataKey::Reserved(asset.clone()))
            .unwrap_or(0);
        if held - reserved < amount {
            return Err(Error::InsufficientLiquidity);
        }
        Ok(())
    }

    /// Debt value may not exceed the loan-to-value weighted collateral value.
    fn require_healthy(env: &Env, account: &Address) -> Result<(), Error> {
        let mut borrow_limit = 0_i128;
        let mut debt = 0_i128;
        for asset in Self::assets(env).iter() {
            let price = Self::price(env.clone(), asset.clone());
            let max_ltv = Self::max_loan_to_value(env.clone(), asset.clone());

            let supplied = Self::read(env, &DataKey::Supplied(account.clone(), asset.clone()));
            let value = mul_div_floor(supplied, price, PRICE_SCALE)?;
            let limit = mul_div_floor(value, max_ltv as i128, RATIO_SCALE as i128)?;
            borrow_limit = checked_add(borrow_limit, limit)?;

            let borrowed = Self::read(env, &DataKey::Borrowed(account.clone(), asset));
            debt = checked_add(debt, mul_div_ceil(borrowed, price, PRICE_SCALE)?)?;
        }
        if debt > borrow_limit {
            return Err(Error::RatioBoundExceeded);
        }
        Ok(())
    }
}
