use alloy::primitives::{address, Address};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Tick grid
// ---------------------------------------------------------------------------

/// Lowest tick representable on the V3 grid.
pub const MIN_TICK: i32 = -887_272;

/// Highest tick representable on the V3 grid.
pub const MAX_TICK: i32 = 887_272;

/// Base half-width in ticks for a fresh range, before the configured
/// multiplier is applied. A spacing coarser than this saturates at it.
pub const BASE_HALF_WIDTH_TICKS: i32 = 30;

// ---------------------------------------------------------------------------
// Numeric constants
// ---------------------------------------------------------------------------

/// Basis-point denominator for slippage math.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Wei per gwei.
pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Gas headroom applied on top of `estimateGas`.
pub const GAS_LIMIT_HEADROOM: f64 = 1.2;

/// Default in-range swap threshold, in USDC-denominated value.
pub const DEFAULT_MIN_SWAP_VALUE_USDC: Decimal = dec!(20);

// ---------------------------------------------------------------------------
// Base mainnet addresses
// ---------------------------------------------------------------------------

pub const TOKEN_WETH: Address = address!("4200000000000000000000000000000000000006");
pub const TOKEN_USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// Uniswap V3 NonfungiblePositionManager on Base.
pub const POSITION_MANAGER: Address = address!("03a520b32C04BF3bEEf7BEb72E919cf822Ed34f1");

/// Uniswap V3 factory on Base.
pub const UNISWAP_V3_FACTORY: Address = address!("33128a8fC17869897dcE68Ed026d694621f6FDfD");

/// Uniswap SwapRouter02 on Base.
pub const SWAP_ROUTER: Address = address!("2626664c2603336E57B271c5C0b26F421741e481");

/// Uniswap QuoterV2 on Base.
pub const QUOTER_V2: Address = address!("3d4e44Eb1374240CE5F1B871ab261CD16335B76a");

/// Canonical Permit2 deployment (same address on every chain).
pub const PERMIT2: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");

// ---------------------------------------------------------------------------
// Aggregator defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_AGGREGATOR_BASE_URL: &str = "https://aggregator-api.kyberswap.com";
pub const DEFAULT_AGGREGATOR_CHAIN: &str = "base";

/// Fee tiers probed by the pool locator when none are configured, in order.
pub const DEFAULT_FEE_TIERS: [u32; 4] = [100, 500, 3_000, 10_000];
