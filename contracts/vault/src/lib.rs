//! # Leveraged Vault Contract
//!
//! An ERC-4626 style vault over a single collateral token. Depositors receive
//! shares; the collateral is handed to a leverage strategy that borrows
//! against it on a lending market and keeps its debt-to-collateral ratio near
//! a target.
//!
//! ## Share Accounting Model
//!
//! Shares are a proportional claim on `total_assets`, which is the collateral
//! idle in the vault plus the strategy's net position:
//!
//! ```text
//! total_assets = idle collateral + strategy.total_assets()
//! shares       = assets * total_shares / total_assets
//! assets       = shares * total_assets / total_shares
//! ```
//!
//! The first deposit mints shares 1:1. Later deposits are priced on what
//! they add to `total_assets` once levered, as quoted by the strategy, so
//! the cost of wrapping borrowed funds falls on the depositor and not on
//! existing holders. Every conversion rounds in the vault's favour:
//! `deposit` and `redeem` round down, `mint` and `withdraw` round up. When
//! shares exist but the position is worth nothing, `total_assets` is
//! treated as 1 in the denominator.
//!
//! ## Asset Flow
//!
//! ```text
//! Deposit Flow:
//! User → approve(vault) → [Vault.deposit()] → transfer_from → [Strategy]
//!                               ↓                                ↓
//!                        shares minted                  supply + leverage loop
//!
//! Withdraw Flow:
//! User → [Vault.withdraw()] → shares burned → idle collateral → receiver
//!                                    ↓
//!                           [Strategy.withdraw()] → unwind → receiver
//! ```
//!
//! ## Storage Layout
//!
//! ### Instance Storage
//! - `Owner`: administrator (strategy assignment, pause)
//! - `Asset`: the collateral token, fixed at initialization
//! - `Strategy`: the strategy currently managing the collateral, if any
//! - `Paused`: blocks `deposit` and `mint`
//! - `TotalShares`: sum of all share balances
//!
//! ### Persistent Storage
//! - `Shares(account)`: share balance
//! - `Allowance(owner, spender)`: shares `spender` may withdraw or redeem
//!   on behalf of `owner`

#![no_std]

use core::fmt::Debug;

use leverage_common::{
    constants::{
        BALANCE_BUMP_AMOUNT, BALANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT,
        INSTANCE_LIFETIME_THRESHOLD,
    },
    guard,
    interfaces::forward_result,
    math, Error, Rounding, StrategyClient,
};
use soroban_sdk::{
    contract, contractimpl, contracttype, symbol_short, token, Address, Env, TryFromVal, Val,
};

/// Attempts at sizing a `mint` deposit before giving up.
const MINT_QUOTE_ROUNDS: u32 = 8;

// ============================================================================
// STORAGE KEYS
// ============================================================================

/// Storage keys for vault state.
///
/// Configuration and share supply live in instance storage; per-account
/// balances and allowances live in persistent storage.
#[contracttype]
pub enum DataKey {
    /// Vault administrator
    Owner,
    /// Collateral token accepted by the vault
    Asset,
    /// Strategy currently managing the collateral
    Strategy,
    /// When true, deposits and mints are rejected
    Paused,
    /// Total shares outstanding
    TotalShares,
    /// Share balance of an account
    Shares(Address),
    /// Share allowance (owner, spender)
    Allowance(Address, Address),
}

// ============================================================================
// EVENTS
// ============================================================================

/// Emitted on `deposit` and `mint`.
///
/// # Topics
/// - `SymbolShort("deposit")` or `SymbolShort("mint")`
#[contracttype]
pub struct DepositEvent {
    /// Account the collateral was pulled from
    pub caller: Address,
    /// Account credited with the shares
    pub receiver: Address,
    pub assets: i128,
    pub shares: i128,
}

/// Emitted on `withdraw` and `redeem`.
///
/// # Topics
/// - `SymbolShort("withdraw")` or `SymbolShort("redeem")`
#[contracttype]
pub struct WithdrawEvent {
    pub caller: Address,
    pub receiver: Address,
    /// Account whose shares were burned
    pub owner: Address,
    /// Collateral actually paid to `receiver`
    pub assets: i128,
    pub shares: i128,
}

/// Emitted when the vault is paused or unpaused.
///
/// # Topics
/// - `SymbolShort("pause")` or `SymbolShort("unpause")`
#[contracttype]
pub struct PauseEvent {
    pub paused: bool,
    pub caller: Address,
}

/// Emitted when a strategy is assigned.
///
/// # Topics
/// - `SymbolShort("strategy")`
#[contracttype]
pub struct StrategyEvent {
    pub old_strategy: Option<Address>,
    pub new_strategy: Address,
    /// Idle collateral forwarded to the new strategy
    pub forwarded: i128,
}

/// Emitted when the current strategy is unwound and detached.
///
/// # Topics
/// - `SymbolShort("retire")`
#[contracttype]
pub struct RetireEvent {
    pub strategy: Address,
    pub freed: i128,
}

#[contracttype]
pub struct ApproveEvent {
    pub owner: Address,
    pub spender: Address,
    pub amount: i128,
}

#[contracttype]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub amount: i128,
}

// ============================================================================
// CONTRACT
// ============================================================================

/// Leveraged Vault - share accounting in front of a leverage strategy
///
/// # Security Model
///
/// - Restricted entry points take an explicit `caller`, require its
///   authorization and compare it with the stored owner
/// - Shares are minted and burned before any external call
/// - Every mutating entry point holds a reentrancy flag
/// - Pause blocks new deposits only; withdrawals always stay open
#[contract]
pub struct LeveragedVault;

#[contractimpl]
impl LeveragedVault {
    // ==========================================================================
    // INITIALIZATION
    // ==========================================================================

    /// Initializes the vault.
    ///
    /// # Arguments
    /// * `env` - The Soroban environment
    /// * `owner` - Administrator allowed to assign strategies and pause
    /// * `asset` - The collateral token; it can never be changed
    ///
    /// # Errors
    /// - `AlreadyInitialized` on a second call
    pub fn initialize(env: Env, owner: Address, asset: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }

        let storage = env.storage().instance();
        storage.set(&DataKey::Owner, &owner);
        storage.set(&DataKey::Asset, &asset);
        storage.set(&DataKey::Paused, &false);
        storage.set(&DataKey::TotalShares, &0_i128);
        Self::bump(&env);
        Ok(())
    }

    // ==========================================================================
    // CORE LIFECYCLE - DEPOSIT
    // ==========================================================================

    /// Deposits `amount` of collateral and mints shares to `receiver`.
    ///
    /// The vault pulls the collateral from `caller` through a token allowance
    /// and hands it to the strategy, which levers it up.
    ///
    /// # Arguments
    /// * `env` - The Soroban environment
    /// * `caller` - Account paying the collateral (must authorize and have
    ///   approved the vault for at least `amount`)
    /// * `amount` - Collateral to deposit
    /// * `receiver` - Account credited with the shares
    ///
    /// # Returns
    /// The number of shares minted, rounded down.
    ///
    /// # Errors
    /// - `ZeroAmount` if `amount` is not positive or buys no shares
    /// - `VaultPaused` if the vault is paused
    /// - `NoStrategy` if no strategy is assigned
    /// - `InsufficientAllowance` if the token allowance is below `amount`
    ///
    /// # Events
    /// Emits `DepositEvent` under `deposit`.
    pub fn deposit(
        env: Env,
        caller: Address,
        amount: i128,
        receiver: Address,
    ) -> Result<i128, Error> {
        guard::enter(&env)?;
        caller.require_auth();
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }
        let strategy = Self::require_depositable(&env, &caller, amount)?;

        let (shares, added) = Self::quote_deposit(&env, amount)?;
        if shares == 0 {
            return Err(Error::ZeroAmount);
        }
        Self::invest(&env, &strategy, &caller, &receiver, amount, shares, added)?;

        env.events().publish(
            (symbol_short!("deposit"),),
            DepositEvent { caller, receiver, assets: amount, shares },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(shares)
    }

    /// Mints exactly `shares` to `receiver`, pulling from `caller` the
    /// smallest amount of collateral a `deposit` would mint them for.
    ///
    /// # Returns
    /// The collateral pulled from `caller`.
    ///
    /// # Errors
    /// Same as [`LeveragedVault::deposit`].
    ///
    /// # Events
    /// Emits `DepositEvent` under `mint`.
    pub fn mint(env: Env, caller: Address, shares: i128, receiver: Address) -> Result<i128, Error> {
        guard::enter(&env)?;
        caller.require_auth();
        if shares <= 0 {
            return Err(Error::ZeroAmount);
        }

        let assets = Self::mint_assets(&env, shares)?;
        if assets == 0 {
            return Err(Error::ZeroAmount);
        }
        let strategy = Self::require_depositable(&env, &caller, assets)?;
        let (_, added) = Self::quote_deposit(&env, assets)?;
        Self::invest(&env, &strategy, &caller, &receiver, assets, shares, added)?;

        env.events().publish(
            (symbol_short!("mint"),),
            DepositEvent { caller, receiver, assets, shares },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(assets)
    }

    // ==========================================================================
    // CORE LIFECYCLE - WITHDRAW
    // ==========================================================================

    /// Withdraws exactly `assets` of collateral to `receiver`, burning the
    /// shares of `owner` they are worth (rounded up).
    ///
    /// Idle collateral held by the vault is paid first; the strategy unwinds
    /// leverage to free the remainder. Allowed while paused.
    ///
    /// # Arguments
    /// * `env` - The Soroban environment
    /// * `caller` - `owner` itself or a spender with a share allowance
    /// * `assets` - Collateral to withdraw
    /// * `receiver` - Account receiving the collateral
    /// * `owner` - Account whose shares are burned
    ///
    /// # Returns
    /// The number of shares burned.
    ///
    /// # Errors
    /// - `ZeroAmount` if `assets` is not positive
    /// - `InsufficientAllowance` if `caller` is not `owner` and its share
    ///   allowance is too small
    /// - `InsufficientShares` if `owner` holds too few shares
    /// - `InsufficientLiquidity` if the strategy cannot free the collateral
    ///
    /// # Events
    /// Emits `WithdrawEvent` under `withdraw`.
    pub fn withdraw(
        env: Env,
        caller: Address,
        assets: i128,
        receiver: Address,
        owner: Address,
    ) -> Result<i128, Error> {
        guard::enter(&env)?;
        caller.require_auth();
        if assets <= 0 {
            return Err(Error::ZeroAmount);
        }

        let shares = Self::to_shares(&env, assets, Rounding::Ceil)?;
        Self::burn_from(&env, &caller, &owner, shares)?;
        let paid = Self::pay_out(&env, assets, &receiver)?;

        env.events().publish(
            (symbol_short!("withdraw"),),
            WithdrawEvent { caller, receiver, owner, assets: paid, shares },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(shares)
    }

    /// Burns exactly `shares` of `owner` and pays the collateral they are
    /// worth (rounded down) to `receiver`. Allowed while paused.
    ///
    /// # Returns
    /// The collateral paid to `receiver`.
    ///
    /// # Errors
    /// Same as [`LeveragedVault::withdraw`]; `ZeroAmount` also when the
    /// shares are worth nothing.
    ///
    /// # Events
    /// Emits `WithdrawEvent` under `redeem`.
    pub fn redeem(
        env: Env,
        caller: Address,
        shares: i128,
        receiver: Address,
        owner: Address,
    ) -> Result<i128, Error> {
        guard::enter(&env)?;
        caller.require_auth();
        if shares <= 0 {
            return Err(Error::ZeroAmount);
        }

        let assets = Self::to_assets(&env, shares, Rounding::Floor)?;
        if assets == 0 {
            return Err(Error::ZeroAmount);
        }
        Self::burn_from(&env, &caller, &owner, shares)?;
        let paid = Self::pay_out(&env, assets, &receiver)?;

        env.events().publish(
            (symbol_short!("redeem"),),
            WithdrawEvent { caller, receiver, owner, assets: paid, shares },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(paid)
    }

    // ==========================================================================
    // SHARES
    // ==========================================================================

    /// Lets `spender` withdraw or redeem up to `amount` of `owner`'s shares.
    /// Overwrites any previous allowance.
    pub fn approve(env: Env, owner: Address, spender: Address, amount: i128) -> Result<(), Error> {
        owner.require_auth();
        if amount < 0 {
            return Err(Error::ZeroAmount);
        }

        Self::write_persistent(&env, &DataKey::Allowance(owner.clone(), spender.clone()), amount);
        env.events().publish(
            (symbol_short!("approve"),),
            ApproveEvent { owner, spender, amount },
        );
        Ok(())
    }

    /// Moves `amount` shares from `from` to `to`.
    pub fn transfer(env: Env, from: Address, to: Address, amount: i128) -> Result<(), Error> {
        from.require_auth();
        if amount <= 0 {
            return Err(Error::ZeroAmount);
        }

        let from_balance = Self::balance(env.clone(), from.clone());
        if from_balance < amount {
            return Err(Error::InsufficientShares);
        }
        Self::write_persistent(&env, &DataKey::Shares(from.clone()), from_balance - amount);
        let to_balance = Self::balance(env.clone(), to.clone());
        Self::write_persistent(
            &env,
            &DataKey::Shares(to.clone()),
            math::checked_add(to_balance, amount)?,
        );

        env.events().publish(
            (symbol_short!("transfer"),),
            TransferEvent { from, to, amount },
        );
        Ok(())
    }

    // ==========================================================================
    // ADMINISTRATIVE - STRATEGY
    // ==========================================================================

    /// Assigns the strategy that manages the vault's collateral.
    ///
    /// Collateral idle in the vault, for instance after
    /// [`LeveragedVault::retire_strategy`], is forwarded to the new strategy.
    ///
    /// # Arguments
    /// * `env` - The Soroban environment
    /// * `caller` - Must be the owner
    /// * `strategy` - The new strategy contract
    ///
    /// # Errors
    /// - `NotOwner` unless called by the owner
    /// - `StrategyNotEmpty` if the current strategy still holds collateral
    ///   or debt
    /// - `AssetMismatch` if the new strategy manages another token
    /// - `NotVault` if the new strategy is bound to another vault
    ///
    /// # Events
    /// Emits `StrategyEvent` under `strategy`.
    pub fn set_strategy(env: Env, caller: Address, strategy: Address) -> Result<(), Error> {
        guard::enter(&env)?;
        Self::require_owner(&env, &caller)?;

        let old_strategy = Self::strategy(env.clone());
        if let Some(current) = &old_strategy {
            let position = forward_result(StrategyClient::new(&env, current).try_position())?;
            if !position.is_empty() {
                return Err(Error::StrategyNotEmpty);
            }
        }

        let this = env.current_contract_address();
        let client = StrategyClient::new(&env, &strategy);
        if forward_result(client.try_asset())? != Self::asset(env.clone())? {
            return Err(Error::AssetMismatch);
        }
        if forward_result(client.try_vault())? != this {
            return Err(Error::NotVault);
        }
        env.storage().instance().set(&DataKey::Strategy, &strategy);

        let forwarded = Self::asset_client(&env)?.balance(&this);
        if forwarded > 0 {
            Self::asset_client(&env)?.transfer(&this, &strategy, &forwarded);
            forward_result(client.try_deposit(&this, &forwarded))?;
        }

        env.events().publish(
            (symbol_short!("strategy"),),
            StrategyEvent { old_strategy, new_strategy: strategy, forwarded },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(())
    }

    /// Unwinds the current strategy completely and detaches it.
    ///
    /// All debt is repaid and every unit of collateral comes back to the
    /// vault, where it stays idle (and keeps backing the shares) until a new
    /// strategy is assigned. Deposits fail with `NoStrategy` in between.
    ///
    /// # Returns
    /// The collateral returned to the vault.
    ///
    /// # Errors
    /// - `NotOwner` unless called by the owner
    /// - `NoStrategy` if no strategy is assigned
    /// - `InsufficientLiquidity` if the market cannot release the position
    ///
    /// # Events
    /// Emits `RetireEvent` under `retire`.
    pub fn retire_strategy(env: Env, caller: Address) -> Result<i128, Error> {
        guard::enter(&env)?;
        Self::require_owner(&env, &caller)?;

        let strategy = Self::strategy(env.clone()).ok_or(Error::NoStrategy)?;
        let this = env.current_contract_address();
        let freed =
            forward_result(StrategyClient::new(&env, &strategy).try_withdraw_all(&this))?;
        env.storage().instance().remove(&DataKey::Strategy);

        env.events().publish(
            (symbol_short!("retire"),),
            RetireEvent { strategy, freed },
        );
        Self::bump(&env);
        guard::exit(&env);
        Ok(freed)
    }

    // ==========================================================================
    // ADMINISTRATIVE - PAUSE CONTROL
    // ==========================================================================

    /// Pauses the vault. Deposits and mints are rejected while paused;
    /// withdrawals, redemptions and strategy management keep working.
    /// Pausing a paused vault succeeds without changing anything.
    ///
    /// # Errors
    /// - `NotOwner` unless called by the owner
    ///
    /// # Events
    /// Emits `PauseEvent` under `pause`.
    pub fn pause(env: Env, caller: Address) -> Result<(), Error> {
        Self::require_owner(&env, &caller)?;

        env.storage().instance().set(&DataKey::Paused, &true);
        env.events().publish(
            (symbol_short!("pause"),),
            PauseEvent { paused: true, caller },
        );
        Self::bump(&env);
        Ok(())
    }

    /// Unpauses the vault. Unpausing an active vault succeeds without
    /// changing anything.
    ///
    /// # Errors
    /// - `NotOwner` unless called by the owner
    ///
    /// # Events
    /// Emits `PauseEvent` under `unpause`.
    pub fn unpause(env: Env, caller: Address) -> Result<(), Error> {
        Self::require_owner(&env, &caller)?;

        env.storage().instance().set(&DataKey::Paused, &false);
        env.events().publish(
            (symbol_short!("unpause"),),
            PauseEvent { paused: false, caller },
        );
        Self::bump(&env);
        Ok(())
    }

    // ==========================================================================
    // READ FUNCTIONS - CONVERSIONS
    // ==========================================================================

    /// Collateral backing the shares: idle collateral in the vault plus the
    /// strategy's net position.
    pub fn total_assets(env: Env) -> Result<i128, Error> {
        let idle = Self::asset_client(&env)?.balance(&env.current_contract_address());
        match Self::strategy(env.clone()) {
            Some(strategy) => {
                let invested =
                    forward_result(StrategyClient::new(&env, &strategy).try_total_assets())?;
                math::checked_add(idle, invested)
            }
            None => Ok(idle),
        }
    }

    pub fn convert_to_shares(env: Env, assets: i128) -> Result<i128, Error> {
        Self::to_shares(&env, assets, Rounding::Floor)
    }

    pub fn convert_to_assets(env: Env, shares: i128) -> Result<i128, Error> {
        Self::to_assets(&env, shares, Rounding::Floor)
    }

    /// Shares `deposit(assets)` would mint now.
    pub fn preview_deposit(env: Env, assets: i128) -> Result<i128, Error> {
        if assets <= 0 {
            return Ok(0);
        }
        Ok(Self::quote_deposit(&env, assets)?.0)
    }

    /// Collateral `mint(shares)` would pull now.
    pub fn preview_mint(env: Env, shares: i128) -> Result<i128, Error> {
        if shares <= 0 {
            return Ok(0);
        }
        Self::mint_assets(&env, shares)
    }

    /// Shares `withdraw(assets)` would burn now.
    pub fn preview_withdraw(env: Env, assets: i128) -> Result<i128, Error> {
        Self::to_shares(&env, assets, Rounding::Ceil)
    }

    /// Collateral `redeem(shares)` would pay now.
    pub fn preview_redeem(env: Env, shares: i128) -> Result<i128, Error> {
        Self::to_assets(&env, shares, Rounding::Floor)
    }

    pub fn max_withdraw(env: Env, owner: Address) -> Result<i128, Error> {
        let shares = Self::balance(env.clone(), owner);
        Self::to_assets(&env, shares, Rounding::Floor)
    }

    pub fn max_redeem(env: Env, owner: Address) -> i128 {
        Self::balance(env, owner)
    }

    // ==========================================================================
    // READ FUNCTIONS
    // ==========================================================================

    pub fn total_shares(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::TotalShares)
            .unwrap_or(0)
    }

    /// Share balance of `account`.
    pub fn balance(env: Env, account: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Shares(account))
            .unwrap_or(0)
    }

    pub fn allowance(env: Env, owner: Address, spender: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Allowance(owner, spender))
            .unwrap_or(0)
    }

    /// The collateral token.
    pub fn asset(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Asset)
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        Self::read(&env, &DataKey::Owner)
    }

    pub fn strategy(env: Env) -> Option<Address> {
        env.storage().instance().get(&DataKey::Strategy)
    }

    pub fn is_paused(env: Env) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::Paused)
            .unwrap_or(false)
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl LeveragedVault {
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

    fn write_persistent(env: &Env, key: &DataKey, amount: i128) {
        let storage = env.storage().persistent();
        storage.set(key, &amount);
        storage.extend_ttl(key, BALANCE_LIFETIME_THRESHOLD, BALANCE_BUMP_AMOUNT);
    }

    fn asset_client(env: &Env) -> Result<token::Client<'static>, Error> {
        Ok(token::Client::new(env, &Self::read(env, &DataKey::Asset)?))
    }

    fn require_owner(env: &Env, caller: &Address) -> Result<(), Error> {
        caller.require_auth();
        let owner: Address = Self::read(env, &DataKey::Owner)?;
        if *caller != owner {
            return Err(Error::NotOwner);
        }
        Ok(())
    }

    /// Checks a deposit of `assets` from `caller` can go ahead and returns
    /// the strategy that will receive it.
    fn require_depositable(env: &Env, caller: &Address, assets: i128) -> Result<Address, Error> {
        if Self::is_paused(env.clone()) {
            return Err(Error::VaultPaused);
        }
        let strategy = Self::strategy(env.clone()).ok_or(Error::NoStrategy)?;
        let allowance =
            Self::asset_client(env)?.allowance(caller, &env.current_contract_address());
        if allowance < assets {
            return Err(Error::InsufficientAllowance);
        }
        Ok(strategy)
    }

    fn to_shares(env: &Env, assets: i128, rounding: Rounding) -> Result<i128, Error> {
        let supply = Self::total_shares(env.clone());
        if supply == 0 {
            return Ok(assets);
        }
        let total = Self::total_assets(env.clone())?.max(1);
        math::mul_div(assets, supply, total, rounding)
    }

    fn to_assets(env: &Env, shares: i128, rounding: Rounding) -> Result<i128, Error> {
        let supply = Self::total_shares(env.clone());
        if supply == 0 {
            return Ok(shares);
        }
        let total = Self::total_assets(env.clone())?;
        math::mul_div(shares, total, supply, rounding)
    }

    /// Shares a deposit of `assets` mints, and what it adds to
    /// `total_assets` once the strategy has levered it.
    fn quote_deposit(env: &Env, assets: i128) -> Result<(i128, i128), Error> {
        let added = match Self::strategy(env.clone()) {
            Some(strategy) => forward_result(
                StrategyClient::new(env, &strategy).try_preview_deposit(&assets),
            )?,
            None => assets,
        };
        let supply = Self::total_shares(env.clone());
        if supply == 0 {
            return Ok((assets, added));
        }
        let total = Self::total_assets(env.clone())?.max(1);
        Ok((math::mul_div(added, supply, total, Rounding::Floor)?, added))
    }

    /// Smallest deposit found that mints at least `shares`.
    fn mint_assets(env: &Env, shares: i128) -> Result<i128, Error> {
        if Self::total_shares(env.clone()) == 0 {
            return Ok(shares);
        }
        let mut assets = Self::to_assets(env, shares, Rounding::Ceil)?.max(1);
        for _ in 0..MINT_QUOTE_ROUNDS {
            let (quoted, _) = Self::quote_deposit(env, assets)?;
            if quoted >= shares {
                return Ok(assets);
            }
            let extra = if quoted == 0 {
                assets
            } else {
                math::mul_div(shares - quoted, assets, quoted, Rounding::Ceil)?
            };
            assets = math::checked_add(assets, extra.max(1))?;
        }
        Err(Error::MathOverflow)
    }

    /// Mints `shares` to `receiver`, then moves `assets` from `caller`
    /// straight to the strategy and lets it lever them. Fails unless the
    /// strategy grows by at least the quoted `added`.
    fn invest(
        env: &Env,
        strategy: &Address,
        caller: &Address,
        receiver: &Address,
        assets: i128,
        shares: i128,
        added: i128,
    ) -> Result<(), Error> {
        let balance = Self::balance(env.clone(), receiver.clone());
        let supply = Self::total_shares(env.clone());
        Self::write_persistent(
            env,
            &DataKey::Shares(receiver.clone()),
            math::checked_add(balance, shares)?,
        );
        env.storage()
            .instance()
            .set(&DataKey::TotalShares, &math::checked_add(supply, shares)?);

        let this = env.current_contract_address();
        let client = StrategyClient::new(env, strategy);
        let before = forward_result(client.try_total_assets())?;
        Self::asset_client(env)?.transfer_from(&this, caller, strategy, &assets);
        forward_result(client.try_deposit(&this, &assets))?;
        let after = forward_result(client.try_total_assets())?;
        if math::checked_sub(after, before)? < added {
            return Err(Error::GatewayReverted);
        }
        Ok(())
    }

    /// Burns `shares` of `owner`, spending `caller`'s share allowance when
    /// acting for someone else.
    fn burn_from(env: &Env, caller: &Address, owner: &Address, shares: i128) -> Result<(), Error> {
        if caller != owner {
            let key = DataKey::Allowance(owner.clone(), caller.clone());
            let allowance = Self::allowance(env.clone(), owner.clone(), caller.clone());
            if allowance < shares {
                return Err(Error::InsufficientAllowance);
            }
            Self::write_persistent(env, &key, allowance - shares);
        }

        let balance = Self::balance(env.clone(), owner.clone());
        if balance < shares {
            return Err(Error::InsufficientShares);
        }
        let supply = Self::total_shares(env.clone());
        Self::write_persistent(env, &DataKey::Shares(owner.clone()), balance - shares);
        env.storage()
            .instance()
            .set(&DataKey::TotalShares, &math::checked_sub(supply, shares)?);
        Ok(())
    }

    /// Pays `assets` to `receiver` from idle collateral first, then from the
    /// strategy. Returns the amount paid.
    fn pay_out(env: &Env, assets: i128, receiver: &Address) -> Result<i128, Error> {
        let this = env.current_contract_address();
        let token = Self::asset_client(env)?;
        let from_idle = token.balance(&this).min(assets);
        if from_idle > 0 {
            token.transfer(&this, receiver, &from_idle);
        }

        let remainder = assets - from_idle;
        if remainder == 0 {
            return Ok(from_idle);
        }
        let strategy = Self::strategy(env.clone()).ok_or(Error::InsufficientLiquidity)?;
        let paid = forward_result(
            StrategyClient::new(env, &strategy).try_withdraw(&this, &remainder, receiver),
        )?;
        math::checked_add(from_idle, paid)
    }

    fn bump(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
    }
}
