//! # Leverage Strategy Contract
//!
//! Turns collateral handed over by its vault into a leveraged position on an
//! external lending market and keeps the position's debt-to-collateral ratio
//! near a target set by the strategy manager.
//!
//! ## Leverage Loop
//!
//! ```text
//! supply collateral ─► borrow base asset ─► wrap into collateral ─┐
//!        ▲                                                        │
//!        └────────────────────────────────────────────────────────┘
//! ```
//!
//! The reverse loop (withdraw collateral, unwrap, repay) frees liquidity for
//! withdrawals, lowers the ratio on harvest and fully unwinds the position
//! when the vault retires the strategy.
//!
//! ## Position State
//!
//! Supplied collateral and outstanding debt are never stored here. They are
//! read from the lending market before every step; only configuration lives
//! in instance storage:
//! - `Vault`, `Manager`, `Market`, `Adapter`
//! - `Collateral` / `DebtAsset`: read from the adapter at initialization
//! - `IdealDebtToCollateral`: target ratio in thousandths (`225 == 0.225`)
//! - `LoopConfig`: iteration cap and convergence tolerance
//!
//! ## Roles
//!
//! - the vault: `deposit`, `withdraw`, `withdraw_all`
//! - the manager: `harvest`, `set_debt_to_collateral`
//! - the vault owner: `set_manager`

#![no_std]

mod leverage;
mod position;

use core::fmt::Debug;

use leverage::Engine;
use leverage_common::{
    constants::{INSTANCE_BUMP_AMOUNT, INSTANCE_LIFETIME_THRESHOLD, SAFETY_MARGIN},
    guard,
    interfaces::{forward_result, gateway_result},
    CollateralAdapterClient, Error, HarvestReport, LendingMarketClient, LoopConfig,
    PositionSnapshot, VaultClient,
};
use soroban_sdk::{
    contract, contractimpl, contracttype, symbol_short, token, Address, Env, TryFromVal, Val,
};

// ============================================================================
// STORAGE KEYS
// ============================================================================

#[contracttype]
pub enum DataKey {
    Vault,
    Manager,
    Market,
    Adapter,
    Collateral,
    DebtAsset,
    IdealDebtToCollateral,
    LoopConfig,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Emitted after the vault hands over collateral and the position is levered.
#[contracttype]
pub struct DepositEvent {
    pub amount: i128,
    pub iterations: u32,
    pub ratio: u32,
}

/// Emitted after collateral is released to a withdrawal receiver.
#[contracttype]
pub struct WithdrawEvent {
    pub to: Address,
    pub amount: i128,
    pub ratio: u32,
}

/// Emitted when the whole position is unwound back to the vault.
#[contracttype]
pub struct ExitEvent {
    pub amount: i128,
}

#[contracttype]
pub struct TargetUpdatedEvent {
    pub old_target: u32,
    pub new_target: u32,
}

#[contracttype]
pub struct ManagerUpdatedEvent {
    pub old_manager: Address,
    pub new_manager: Address,
}

// ============================================================================
// CONTRACT
// ============================================================================

#[contract]
pub struct LeverageStrategy;

#[contractimpl]
impl LeverageStrategy {
    /// Binds the strategy to its vault and lending market.
    ///
    /// # Arguments
    /// * `vault` - The only vault allowed to move funds through the strategy
    /// * `manager` - Account allowed to harvest and tune the target ratio
    /// * `market` - Lending market the position is opened on
    /// * `adapter` - Wrapping adapter; its collateral token is the strategy asset
    /// * `ideal_debt_to_collateral` - Target ratio in thousandths
    /// * `config` - Leverage/unwind loop bounds
    ///
    /// # Errors
    /// - `AlreadyInitialized` on a second call
    /// - `InvalidConfig` if `config.max_iterations` is zero
    /// - `RatioBoundExceeded` if the target is not below the market ceiling
    pub fn initialize(
        env: Env,
        vault: Address,
        manager: Address,
        market: Address,
        adapter: Address,
        ideal_debt_to_collateral: u32,
        config: LoopConfig,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Vault) {
            return Err(Error::AlreadyInitialized);
        }
        if config.max_iterations == 0 {
            return Err(Error::InvalidConfig);
        }

        let adapter_client = CollateralAdapterClient::new(&env, &adapter);
        let collateral = gateway_result(adapter_client.try_collateral_asset())?;
        let debt_asset = gateway_result(adapter_client.try_base_asset())?;
        Self::require_below_ceiling(&env, &market, &collateral, ideal_debt_to_collateral)?;

        let storage = env.storage().instance();
        storage.set(&DataKey::Vault, &vault);
        storage.set(&DataKey::Manager, &manager);
        storage.set(&DataKey::Market, &market);
        storage.set(&DataKey::Adapter, &adapter);
        storage.set(&DataKey::Collateral, &collateral);
        storage.set(&DataKey::DebtAsset, &debt_asset);
        storage.set(&DataKey::IdealDebtToCollateral, &ideal_debt_to_collateral);
        storage.set(&DataKey::LoopConfig, &config);
        Self::bump(&env);
        Ok(())
    }

    // ==========================================================================
    // VAULT ENTRY POINTS
    // ==========================================================================

    /// Supplies collateral already transferred by the vault and levers the
    /// position toward the target ratio.
    pub fn deposit(env: Env, caller: Address, amount: i128) -> Result<(), Error> {
        guard::enter(&env)?;
        Self::require_vault(&env, &caller)?;
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }

        let engine = Self::engine(&env)?;
        engine.supply_idle()?;
        let iterations = engine.lever()?;
        let ratio = engine.position()?.ratio();

        env.events().publish(
            (symbol_short!("deposit"),),
            DepositEvent { amount, iterations, ratio },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(())
    }

    /// Frees `amount` of collateral, unwinding leverage if needed, and sends
    /// it to `to`. Returns the amount sent.
    ///
    /// # Errors
    /// - `NotVault` unless called by the bound vault
    /// - `InsufficientLiquidity` if the amount exceeds the net position or
    ///   the market cannot release it
    pub fn withdraw(env: Env, caller: Address, amount: i128, to: Address) -> Result<i128, Error> {
        guard::enter(&env)?;
        Self::require_vault(&env, &caller)?;
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }

        let engine = Self::engine(&env)?;
        let paid = engine.release(amount, &to)?;
        let ratio = engine.position()?.ratio();

        env.events().publish(
            (symbol_short!("withdraw"),),
            WithdrawEvent { to, amount: paid, ratio },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(paid)
    }

    /// Repays all debt and returns every unit of collateral to the vault.
    pub fn withdraw_all(env: Env, caller: Address) -> Result<i128, Error> {
        guard::enter(&env)?;
        Self::require_vault(&env, &caller)?;

        let engine = Self::engine(&env)?;
        let amount = engine.exit()?;
        if amount > 0 {
            token::Client::new(&env, &Self::asset(env.clone())?).transfer(
                &env.current_contract_address(),
                &caller,
                &amount,
            );
        }

        env.events().publish((symbol_short!("exit"),), ExitEvent { amount });
        Self::bump(&env);
        guard::exit(&env);
        Ok(amount)
    }

    // ==========================================================================
    // MANAGER ENTRY POINTS
    // ==========================================================================

    /// Brings the ratio back within tolerance of the target.
    ///
    /// Idle collateral is supplied first. Below the target the position is
    /// levered, above it the position is unwound, each for at most
    /// `max_iterations` rounds. A position already within tolerance is left
    /// untouched and the report shows zero iterations.
    ///
    /// # Errors
    /// - `NotManager` unless called by the manager
    /// - `RatioBoundExceeded` if the position is over-levered and the market
    ///   leaves no room to withdraw collateral
    pub fn harvest(env: Env, caller: Address) -> Result<HarvestReport, Error> {
        guard::enter(&env)?;
        Self::require_manager(&env, &caller)?;

        let engine = Self::engine(&env)?;
        let target = Self::ideal_debt_to_collateral(env.clone())?;
        let tolerance = Self::loop_config(env.clone())?.tolerance;

        let ratio_before = engine.position()?.ratio();
        let supplied_idle = engine.supply_idle()?;
        let ratio = engine.position()?.ratio();

        let iterations = if ratio.saturating_add(tolerance) < target {
            engine.lever()?
        } else if ratio > target.saturating_add(tolerance) {
            let rounds = engine.deleverage()?;
            engine.supply_idle()?;
            rounds
        } else {
            0
        };

        let report = HarvestReport {
            ratio_before,
            ratio_after: engine.position()?.ratio(),
            iterations,
        };
        if iterations > 0 || supplied_idle > 0 {
            env.events().publish((symbol_short!("harvest"),), report.clone());
        }
        Self::bump(&env);
        guard::exit(&env);
        Ok(report)
    }

    /// Sets the target ratio used from the next deposit, withdrawal or
    /// harvest on. Does not rebalance.
    ///
    /// # Errors
    /// - `NotManager` unless called by the manager
    /// - `RatioBoundExceeded` if `target` is not below the market's maximum
    ///   loan-to-value minus the safety margin
    pub fn set_debt_to_collateral(env: Env, caller: Address, target: u32) -> Result<(), Error> {
        Self::require_manager(&env, &caller)?;
        let market = Self::market(env.clone())?;
        let collateral = Self::asset(env.clone())?;
        Self::require_below_ceiling(&env, &market, &collateral, target)?;

        let old_target = Self::ideal_debt_to_collateral(env.clone())?;
        env.storage()
            .instance()
            .set(&DataKey::IdealDebtToCollateral, &target);
        env.events().publish(
            (symbol_short!("target"),),
            TargetUpdatedEvent { old_target, new_target: target },
        );
        Self::bump(&env);
        Ok(())
    }

    // ==========================================================================
    // ADMINISTRATIVE
    // ==========================================================================

    /// Replaces the manager. Only the owner of the bound vault may call this.
    pub fn set_manager(env: Env, caller: Address, manager: Address) -> Result<(), Error> {
        caller.require_auth();
        let vault = Self::vault(env.clone())?;
        let owner = forward_result(VaultClient::new(&env, &vault).try_owner())?;
        if caller != owner {
            return Err(Error::NotOwner);
        }

        let old_manager = Self::manager(env.clone())?;
        env.storage().instance().set(&DataKey::Manager, &manager);
        env.events().publish(
            (symbol_short!("manager"),),
            ManagerUpdatedEvent { old_manager, new_manager: manager },
        );
        Self::bump(&env);
        Ok(())
    }

    // ==========================================================================
    // READ FUNCTIONS
    // ==========================================================================

    /// Net collateral managed by the strategy: idle plus supplied collateral
    /// minus the collateral the adapter needs to unwrap to repay the debt.
    /// This is what a full withdrawal pays out.
    pub fn total_assets(env: Env) -> Result<i128, Error> {
        Self::engine(&env)?.total_assets()
    }

    /// Increase in `total_assets` that a `deposit` of `amount` would produce
    /// at current prices, after the cost of levering it.
    ///
    /// # Errors
    /// - `ZeroAmount` if `amount` is not positive
    pub fn preview_deposit(env: Env, amount: i128) -> Result<i128, Error> {
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        Self::engine(&env)?.preview_deposit(amount)
    }

    pub fn position(env: Env) -> Result<PositionSnapshot, Error> {
        Ok(Self::engine(&env)?.position()?.snapshot())
    }

    pub fn current_ratio(env: Env) -> Result<u32, Error> {
        Ok(Self::engine(&env)?.position()?.ratio())
    }

    pub fn ideal_debt_to_collateral(env: Env) -> Result<u32, Error> {
        Self::read(&env, &DataKey::IdealDebtToCollateral)
    }

    pub fn loop_config(env: Env) -> Result<LoopConfig, Error> {
        Self::read(&env, &DataKey::LoopConfig)
    }

    pub fn manager(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Manager)
    }

    pub fn vault(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Vault)
    }

    /// The collateral token.
    pub fn asset(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Collateral)
    }

    /// The token borrowed from the market.
    pub fn debt_asset(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::DebtAsset)
    }

    pub fn market(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Market)
    }

    pub fn adapter(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Adapter)
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl LeverageStrategy {
    fn read<V>(env: &Env, key: &DataKey) -> Result<V, Error>
    where
        V: TryFromVal<Env, Val>,
        V::Error: Debug,
    {
        env.storage()
            .instance()
            .get(key)
            .ok_or(Error::NotInitialized)
    }

    fn engine(env: &Env) -> Result<Engine<'static>, Error> {
        Ok(Engine::new(
            env,
            &Self::read(env, &DataKey::Market)?,
            &Self::read(env, &DataKey::Adapter)?,
            Self::read(env, &DataKey::Collateral)?,
            Self::read(env, &DataKey::DebtAsset)?,
            Self::read(env, &DataKey::IdealDebtToCollateral)?,
            Self::read(env, &DataKey::LoopConfig)?,
        ))
    }

    fn require_vault(env: &Env, caller: &Address) -> Result<(), Error> {
        caller.require_auth();
        let vault: Address = Self::read(env, &DataKey::Vault)?;
        if *caller != vault {
            return Err(Error::NotVault);
        }
        Ok(())
    }

    fn require_manager(env: &Env, caller: &Address) -> Result<(), Error> {
        caller.require_auth();
        let manager: Address = Self::read(env, &DataKey::Manager)?;
        if *caller != manager {
            return Err(Error::NotManager);
        }
        Ok(())
    }

    fn require_below_ceiling(
        env: &Env,
        market: &Address,
        collateral: &Address,
        target: u32,
    ) -> Result<(), Error> {
        let max_ltv = LendingMarketClient::new(env, market).max_loan_to_value(collateral);
        if target >= max_ltv.saturating_sub(SAFETY_MARGIN) {
            return Err(Error::RatioBoundExceeded);
        }
        Ok(())
    }

    fn bump(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
    }
}

#[cfg(test)]
mod test;
