//! Reference implementations of the external collaborators of the leveraged
//! vault, used by the contract test suites:
//!
//! - [`MockLendingMarket`]: a single-pool lending market with admin-set
//!   prices, loan-to-value limits, reserved (lent out) liquidity and manual
//!   interest accrual
//! - [`MockCollateralAdapter`]: wraps a base asset into a collateral token at
//!   a fixed rate, minus an optional spread

#![no_std]

mod adapter;
mod lending_market;

pub use adapter::{MockCollateralAdapter, MockCollateralAdapterClient};
pub use lending_market::{MockLendingMarket, MockLendingMarketClient};
