use soroban_sdk::contracterror;

/// Errors returned by the vault, the strategy and the reference market.
///
/// Codes are stable: off-chain tooling matches on the numeric value.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    // Authorization
    NotOwner = 1,
    NotManager = 2,
    InsufficientAllowance = 3,

    // Lifecycle state
    VaultPaused = 4,
    NoStrategy = 5,
    StrategyNotEmpty = 6,

    // Accounting
    InsufficientShares = 7,
    ZeroAmount = 8,

    // Lending market
    InsufficientLiquidity = 9,
    GatewayReverted = 10,
    RatioBoundExceeded = 11,

    // Setup and wiring
    AlreadyInitialized = 12,
    NotInitialized = 13,
    NotVault = 14,
    AssetMismatch = 15,
    Reentrant = 16,
    InvalidConfig = 17,
    MathOverflow = 18,
}
