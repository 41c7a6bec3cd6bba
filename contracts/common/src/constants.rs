/// Scale of every debt-to-collateral ratio: `225` means `0.225`.
pub const RATIO_SCALE: u32 = 1_000;

/// Scale of lending market prices (7 decimals, as Stellar assets).
pub const PRICE_SCALE: i128 = 10_000_000;

/// Distance kept below the market's maximum loan-to-value, in ratio units.
pub const SAFETY_MARGIN: u32 = 50;

/// Default bound on leverage and unwind loop iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default distance from the target ratio considered converged, in ratio units.
pub const DEFAULT_TOLERANCE: u32 = 1;

/// Ledgers a token approval handed to the market or adapter stays live.
pub const APPROVAL_LEDGERS: u32 = 100;

pub const DAY_IN_LEDGERS: u32 = 17_280;
pub const INSTANCE_BUMP_AMOUNT: u32 = 7 * DAY_IN_LEDGERS;
pub const INSTANCE_LIFETIME_THRESHOLD: u32 = INSTANCE_BUMP_AMOUNT - DAY_IN_LEDGERS;
pub const BALANCE_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
pub const BALANCE_LIFETIME_THRESHOLD: u32 = BALANCE_BUMP_AMOUNT - DAY_IN_LEDGERS;
