use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

/// An aligned `(tick_lower, tick_upper)` pair.
///
/// Invariants: `lower < upper`, both multiples of the pool's tick spacing,
/// both inside the chain tick bounds. Construction goes through
/// [`crate::core::tick_math::compute_new_range`] which enforces all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }

    /// A position earns fees while `lower <= tick < upper`.
    pub fn contains(&self, tick: i32) -> bool {
        self.lower <= tick && tick < self.upper
    }
}

impl std::fmt::Display for TickRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// Snapshot of an LP NFT as read from the position manager.
///
/// `liquidity == 0` positions are treated as closed and never reach the
/// monitor's candidate set.
#[derive(Debug, Clone)]
pub struct LpPosition {
    pub token_id: U256,
    pub owner: Address,
    pub manager: Address,
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub range: TickRange,
    pub liquidity: u128,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
    /// Gauge custodying this NFT, present iff staked.
    pub gauge: Option<Address>,
    /// Pool backing the position, resolved lazily by the monitor.
    pub pool: Option<Address>,
}

impl LpPosition {
    pub fn is_staked(&self) -> bool {
        self.gauge.is_some()
    }
}

/// Classification of a position against the current pool tick.
#[derive(Debug, Clone, Copy)]
pub struct PositionStatus {
    pub current_tick: i32,
    pub in_range: bool,
    /// Drift past the nearest boundary, as a percentage of the range width.
    /// Zero while in range.
    pub percent_out: f64,
}

/// Target token mix for a tick range at the current price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeRatio {
    /// Value fraction that belongs in token0, in `[0, 1]`.
    pub token0_ratio: f64,
    /// Value fraction that belongs in token1, in `[0, 1]`.
    pub token1_ratio: f64,
    pub in_range: bool,
    pub below_range: bool,
}

/// What the Swapping stage decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapPlan {
    /// Imbalance below the configured value threshold.
    Skip,
    Swap {
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    },
}

/// Outcome of a confirmed swap.
#[derive(Debug, Clone)]
pub struct SwapReceipt {
    pub tx_hash: B256,
    /// Realized output, from the swap event when decodable; otherwise the
    /// quoted amount.
    pub amount_out: U256,
    pub gas_used: u64,
}
