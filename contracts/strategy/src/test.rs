#![cfg(test)]

use super::*;
use leverage_common::constants::{DEFAULT_TOLERANCE, PRICE_SCALE};
use leverage_mocks::{
    MockCollateralAdapter, MockCollateralAdapterClient, MockLendingMarket,
    MockLendingMarketClient,
};
use soroban_sdk::{testutils::Address as _, token, Address, Env};

const UNIT: i128 = 10_000_000;
// One collateral unit is worth 1.25 base units; wrapping yields 0.8.
const COLLATERAL_PRICE: i128 = 12_500_000;
const WRAP_RATE: i128 = 8_000_000;
const MAX_LTV: u32 = 800;
// 0.3% charged on every wrap and unwrap.
const SPREAD_BPS: u32 = 30;

struct Setup<'a> {
    env: Env,
    vault: Address,
    manager: Address,
    strategy: LeverageStrategyClient<'a>,
    market: MockLendingMarketClient<'a>,
    collateral: token::Client<'a>,
    base: token::Client<'a>,
}

fn setup<'a>(target: u32, config: LoopConfig) -> Setup<'a> {
    setup_with_spread(target, config, 0)
}

fn setup_with_spread<'a>(target: u32, config: LoopConfig, spread_bps: u32) -> Setup<'a> {
    let env = Env::default();
    env.mock_all_auths();
    env.budget().reset_unlimited();

    let admin = Address::generate(&env);
    let base = env.register_stellar_asset_contract_v2(admin.clone()).address();
    let collateral = env.register_stellar_asset_contract_v2(admin.clone()).address();

    let market_id = env.register_contract(None, MockLendingMarket);
    let market = MockLendingMarketClient::new(&env, &market_id);
    market.initialize(&admin);
    market.set_asset(&collateral, &COLLATERAL_PRICE, &MAX_LTV);
    market.set_asset(&base, &PRICE_SCALE, &0);

    let adapter_id = env.register_contract(None, MockCollateralAdapter);
    MockCollateralAdapterClient::new(&env, &adapter_id).initialize(
        &base,
        &collateral,
        &WRAP_RATE,
        &spread_bps,
    );

    let base_admin = token::StellarAssetClient::new(&env, &base);
    base_admin.mint(&market_id, &(1_000 * UNIT));
    base_admin.mint(&adapter_id, &(1_000 * UNIT));

    let vault = Address::generate(&env);
    let collateral_admin = token::StellarAssetClient::new(&env, &collateral);
    collateral_admin.mint(&vault, &(100 * UNIT));
    collateral_admin.set_admin(&adapter_id);

    let manager = Address::generate(&env);
    let strategy_id = env.register_contract(None, LeverageStrategy);
    let strategy = LeverageStrategyClient::new(&env, &strategy_id);
    strategy.initialize(&vault, &manager, &market_id, &adapter_id, &target, &config);

    Setup {
        collateral: token::Client::new(&env, &collateral),
        base: token::Client::new(&env, &base),
        env,
        vault,
        manager,
        strategy,
        market,
    }
}

fn deposit(s: &Setup, amount: i128) {
    s.collateral.transfer(&s.vault, &s.strategy.address, &amount);
    s.strategy.deposit(&s.vault, &amount);
}

fn supplied(s: &Setup) -> i128 {
    s.market
        .supplied_balance(&s.strategy.address, &s.collateral.address)
}

fn borrowed(s: &Setup) -> i128 {
    s.market.borrowed_balance(&s.strategy.address, &s.base.address)
}

/// Debt value over collateral value, straight from the market's books.
fn market_ratio(s: &Setup) -> i128 {
    borrowed(s) * PRICE_SCALE * 1_000 / (supplied(s) * COLLATERAL_PRICE)
}

fn ratio(s: &Setup) -> i128 {
    s.strategy.current_ratio() as i128
}

fn assert_near(ratio: i128, target: i128) {
    assert!(
        (ratio - target).abs() <= DEFAULT_TOLERANCE as i128,
        "ratio {} not within tolerance of {}",
        ratio,
        target
    );
}

#[test]
fn test_initialize_reads_assets_from_adapter() {
    let s = setup(225, LoopConfig::default());

    assert_eq!(s.strategy.asset(), s.collateral.address);
    assert_eq!(s.strategy.debt_asset(), s.base.address);
    assert_eq!(s.strategy.vault(), s.vault);
    assert_eq!(s.strategy.manager(), s.manager);
    assert_eq!(s.strategy.ideal_debt_to_collateral(), 225);
    assert_eq!(s.strategy.loop_config(), LoopConfig::default());
    assert_eq!(s.strategy.total_assets(), 0);
}

#[test]
fn test_initialize_twice_fails() {
    let s = setup(225, LoopConfig::default());
    let market = s.strategy.market();
    let adapter = s.strategy.adapter();

    let result = s.strategy.try_initialize(
        &s.vault,
        &s.manager,
        &market,
        &adapter,
        &225,
        &LoopConfig::default(),
    );
    assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));
}

#[test]
fn test_initialize_rejects_bad_target_and_config() {
    let s = setup(225, LoopConfig::default());
    let market = s.strategy.market();
    let adapter = s.strategy.adapter();

    let fresh = LeverageStrategyClient::new(
        &s.env,
        &s.env.register_contract(None, LeverageStrategy),
    );
    let above_ceiling = fresh.try_initialize(
        &s.vault,
        &s.manager,
        &market,
        &adapter,
        &(MAX_LTV - SAFETY_MARGIN),
        &LoopConfig::default(),
    );
    assert_eq!(above_ceiling, Err(Ok(Error::RatioBoundExceeded)));

    let no_iterations = fresh.try_initialize(
        &s.vault,
        &s.manager,
        &market,
        &adapter,
        &225,
        &LoopConfig { max_iterations: 0, tolerance: 1 },
    );
    assert_eq!(no_iterations, Err(Ok(Error::InvalidConfig)));
}

#[test]
fn test_initialize_with_unconfigured_adapter_fails() {
    let s = setup(225, LoopConfig::default());
    let adapter = s.env.register_contract(None, MockCollateralAdapter);
    let unconfigured = MockCollateralAdapterClient::new(&s.env, &adapter);
    assert_eq!(unconfigured.try_base_asset(), Err(Ok(Error::NotInitialized)));
    assert_eq!(
        unconfigured.try_preview_unwrap(&UNIT),
        Err(Ok(Error::NotInitialized))
    );

    let strategy =
        LeverageStrategyClient::new(&s.env, &s.env.register_contract(None, LeverageStrategy));
    let market = s.strategy.market();
    let result = strategy.try_initialize(
        &s.vault,
        &s.manager,
        &market,
        &adapter,
        &225,
        &LoopConfig::default(),
    );
    assert_eq!(result, Err(Ok(Error::GatewayReverted)));
}

#[test]
fn test_deposit_levers_to_target() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);

    assert_near(ratio(&s), 225);
    assert!(market_ratio(&s) <= 225);
    assert!((ratio(&s) - market_ratio(&s)).abs() <= 1);

    // Leverage costs nothing but rounding at a spread-free adapter.
    let total = s.strategy.total_assets();
    assert!(total <= UNIT && total >= UNIT - 10);

    let position = s.strategy.position();
    assert_eq!(position.idle, 0);
    assert_eq!(position.supplied, supplied(&s));
    assert_eq!(position.borrowed, borrowed(&s));
}

#[test]
fn test_deposit_capped_before_converging() {
    let s = setup(225, LoopConfig { max_iterations: 1, tolerance: DEFAULT_TOLERANCE });
    deposit(&s, UNIT);

    // One round borrows against the first supply only: 0.225 / 1.225.
    assert_eq!(market_ratio(&s), 183);

    // Later rounds pick up where the cap stopped.
    let report = s.strategy.harvest(&s.manager);
    assert_eq!(report.ratio_before, 183);
    assert_eq!(report.iterations, 1);
    assert!(report.ratio_after > 183 && report.ratio_after < 225);
}

#[test]
fn test_deposit_only_from_vault() {
    let s = setup(225, LoopConfig::default());
    let stranger = Address::generate(&s.env);

    assert_eq!(
        s.strategy.try_deposit(&stranger, &UNIT),
        Err(Ok(Error::NotVault))
    );
    assert_eq!(
        s.strategy.try_withdraw(&stranger, &UNIT, &stranger),
        Err(Ok(Error::NotVault))
    );
    assert_eq!(
        s.strategy.try_withdraw_all(&stranger),
        Err(Ok(Error::NotVault))
    );
    assert_eq!(s.strategy.try_deposit(&s.vault, &0), Err(Ok(Error::ZeroAmount)));
}

#[test]
fn test_withdraw_unwinds_and_pays_receiver() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, 2 * UNIT);
    let receiver = Address::generate(&s.env);

    let paid = s.strategy.withdraw(&s.vault, &UNIT, &receiver);

    assert_eq!(paid, UNIT);
    assert_eq!(s.collateral.balance(&receiver), UNIT);
    assert!(market_ratio(&s) <= 225 + DEFAULT_TOLERANCE as i128);
    let total = s.strategy.total_assets();
    assert!(total <= UNIT && total >= UNIT - 20);
}

#[test]
fn test_withdraw_more_than_position_fails() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);
    let receiver = Address::generate(&s.env);

    let result = s.strategy.try_withdraw(&s.vault, &(UNIT + 1), &receiver);
    assert_eq!(result, Err(Ok(Error::InsufficientLiquidity)));
}

#[test]
fn test_withdraw_fails_when_market_is_illiquid() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);
    let receiver = Address::generate(&s.env);

    let held = s.collateral.balance(&s.market.address);
    s.market.set_reserved(&s.collateral.address, &held);

    let supplied_before = supplied(&s);
    let borrowed_before = borrowed(&s);

    let result = s.strategy.try_withdraw(&s.vault, &(UNIT / 2), &receiver);
    assert_eq!(result, Err(Ok(Error::InsufficientLiquidity)));

    assert_eq!(supplied(&s), supplied_before);
    assert_eq!(borrowed(&s), borrowed_before);
    assert_eq!(s.collateral.balance(&receiver), 0);
}

#[test]
fn test_harvest_converges_to_new_target() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);

    s.strategy.set_debt_to_collateral(&s.manager, &200);
    assert_eq!(s.strategy.ideal_debt_to_collateral(), 200);
    // the new target waits for a harvest
    assert_near(ratio(&s), 225);

    let report = s.strategy.harvest(&s.manager);
    assert_eq!(report.ratio_before, 224);
    assert!(report.iterations >= 1);
    assert_near(ratio(&s), 200);
    assert_eq!(report.ratio_after as i128, ratio(&s));
}

#[test]
fn test_harvest_is_idempotent() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);
    s.strategy.set_debt_to_collateral(&s.manager, &200);
    s.strategy.harvest(&s.manager);

    let supplied_before = supplied(&s);
    let borrowed_before = borrowed(&s);

    let report = s.strategy.harvest(&s.manager);
    assert_eq!(report.iterations, 0);
    assert_eq!(report.ratio_before, report.ratio_after);
    assert_eq!(supplied(&s), supplied_before);
    assert_eq!(borrowed(&s), borrowed_before);
}

#[test]
fn test_harvest_delevers_after_interest_accrues() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);

    s.market
        .accrue_interest(&s.strategy.address, &s.base.address, &(UNIT / 2));
    assert!(market_ratio(&s) > 225 + DEFAULT_TOLERANCE as i128);

    s.strategy.harvest(&s.manager);
    assert_near(ratio(&s), 225);
}

#[test]
fn test_harvest_relevers_after_price_rise() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);

    s.market.set_price(&s.collateral.address, &(COLLATERAL_PRICE * 2));
    let report = s.strategy.harvest(&s.manager);

    assert!(report.ratio_before < 120);
    assert!(report.iterations > 0);
    assert_near(ratio(&s), 225);
}

#[test]
fn test_harvest_without_room_fails_and_keeps_position() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);

    // Collateral loses most of its value: the ratio is past the ceiling.
    s.market.set_price(&s.collateral.address, &3_000_000);
    let supplied_before = supplied(&s);
    let borrowed_before = borrowed(&s);

    assert_eq!(
        s.strategy.try_harvest(&s.manager),
        Err(Ok(Error::RatioBoundExceeded))
    );
    assert_eq!(supplied(&s), supplied_before);
    assert_eq!(borrowed(&s), borrowed_before);
}

#[test]
fn test_manager_only_operations() {
    let s = setup(225, LoopConfig::default());
    let stranger = Address::generate(&s.env);

    assert_eq!(s.strategy.try_harvest(&stranger), Err(Ok(Error::NotManager)));
    assert_eq!(
        s.strategy.try_set_debt_to_collateral(&stranger, &200),
        Err(Ok(Error::NotManager))
    );
}

#[test]
fn test_set_debt_to_collateral_respects_ceiling() {
    let s = setup(225, LoopConfig::default());

    assert_eq!(
        s.strategy
            .try_set_debt_to_collateral(&s.manager, &(MAX_LTV - SAFETY_MARGIN)),
        Err(Ok(Error::RatioBoundExceeded))
    );
    s.strategy
        .set_debt_to_collateral(&s.manager, &(MAX_LTV - SAFETY_MARGIN - 1));
    assert_eq!(
        s.strategy.ideal_debt_to_collateral(),
        MAX_LTV - SAFETY_MARGIN - 1
    );
}

#[test]
fn test_withdraw_all_repays_everything() {
    let s = setup(225, LoopConfig::default());
    deposit(&s, UNIT);
    let vault_before = s.collateral.balance(&s.vault);

    let returned = s.strategy.withdraw_all(&s.vault);

    assert!(returned <= UNIT && returned >= UNIT - 10);
    assert_eq!(s.collateral.balance(&s.vault), vault_before + returned);
    assert_eq!(borrowed(&s), 0);
    assert_eq!(supplied(&s), 0);
    assert!(s.strategy.position().is_empty());
    assert_eq!(s.strategy.total_assets(), 0);
}

// ============================================================================
// CONVERSION SPREAD
// ============================================================================

#[test]
fn test_total_assets_prices_in_the_exit_spread() {
    let s = setup_with_spread(225, LoopConfig::default(), SPREAD_BPS);
    deposit(&s, UNIT);

    let total = s.strategy.total_assets();
    let position = s.strategy.position();
    // below both the deposit and the market valuation of the position
    assert!(total < UNIT - 1_000);
    assert!(total > UNIT * 99 / 100);
    assert!(total < position.supplied - position.debt_in_collateral);
}

#[test]
fn test_full_withdraw_with_spread_pays_exactly() {
    let s = setup_with_spread(225, LoopConfig::default(), SPREAD_BPS);
    deposit(&s, UNIT);
    let receiver = Address::generate(&s.env);

    let total = s.strategy.total_assets();
    let paid = s.strategy.withdraw(&s.vault, &total, &receiver);

    assert_eq!(paid, total);
    assert_eq!(s.collateral.balance(&receiver), total);
    assert_eq!(borrowed(&s), 0);
    assert_eq!(
        s.strategy.try_withdraw(&s.vault, &(s.strategy.total_assets() + 1), &receiver),
        Err(Ok(Error::InsufficientLiquidity))
    );
}

#[test]
fn test_partial_withdraw_with_spread_keeps_the_rest_levered() {
    let s = setup_with_spread(225, LoopConfig::default(), SPREAD_BPS);
    deposit(&s, 2 * UNIT);
    let receiver = Address::generate(&s.env);
    let before = s.strategy.total_assets();

    let paid = s.strategy.withdraw(&s.vault, &UNIT, &receiver);

    assert_eq!(paid, UNIT);
    assert_eq!(s.collateral.balance(&receiver), UNIT);
    assert!(borrowed(&s) > 0);
    assert!(market_ratio(&s) <= 225 + DEFAULT_TOLERANCE as i128);
    assert!((s.strategy.total_assets() - (before - UNIT)).abs() <= 100);
}

#[test]
fn test_withdraw_all_with_spread_clears_debt() {
    let s = setup_with_spread(225, LoopConfig::default(), SPREAD_BPS);
    deposit(&s, UNIT);
    let total = s.strategy.total_assets();
    let vault_before = s.collateral.balance(&s.vault);

    let returned = s.strategy.withdraw_all(&s.vault);

    assert!(returned >= total && returned < UNIT);
    assert_eq!(s.collateral.balance(&s.vault), vault_before + returned);
    assert_eq!(borrowed(&s), 0);
    assert_eq!(supplied(&s), 0);
    assert!(s.strategy.position().is_empty());
}

#[test]
fn test_preview_deposit_matches_realized_growth() {
    let s = setup_with_spread(225, LoopConfig::default(), SPREAD_BPS);
    deposit(&s, UNIT);
    let before = s.strategy.total_assets();

    let quoted = s.strategy.preview_deposit(&(2 * UNIT));
    deposit(&s, 2 * UNIT);

    assert_eq!(s.strategy.total_assets() - before, quoted);
    assert!(quoted < 2 * UNIT);
    assert_eq!(
        s.strategy.try_preview_deposit(&0),
        Err(Ok(Error::ZeroAmount))
    );
}

#[test]
fn test_harvest_with_spread_converges() {
    let s = setup_with_spread(225, LoopConfig::default(), SPREAD_BPS);
    deposit(&s, UNIT);

    s.strategy.set_debt_to_collateral(&s.manager, &200);
    let report = s.strategy.harvest(&s.manager);

    assert!(report.iterations >= 1);
    assert_near(ratio(&s), 200);
}
