pub mod monitor;
pub mod pool_locator;
pub mod positions;
pub mod rebalancer;
pub mod tick_math;
pub mod token_cache;
