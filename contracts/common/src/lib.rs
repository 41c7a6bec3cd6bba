//! # Leverage Common
//!
//! Shared building blocks for the leveraged collateral vault and its
//! strategies:
//!
//! - [`Error`]: the error codes every contract in the workspace returns
//! - [`interfaces`]: `#[contractclient]` traits for the vault, the strategy,
//!   the lending market and the collateral wrapping adapter
//! - [`math`]: checked `mul_div` with explicit rounding direction
//! - [`guard`]: reentrancy flag held for the duration of an entry point
//! - [`constants`]: ratio and price scales, loop defaults, TTL bumps

#![no_std]

#[cfg(test)]
extern crate std;

pub mod constants;
pub mod error;
pub mod guard;
pub mod interfaces;
pub mod math;

pub use error::Error;
pub use interfaces::{
    CollateralAdapterClient, HarvestReport, LendingMarketClient, LoopConfig, PositionSnapshot,
    StrategyClient, VaultClient,
};
pub use math::Rounding;
