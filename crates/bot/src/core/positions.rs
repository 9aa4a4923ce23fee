//! LP NFT enumeration and range classification.
//!
//! Walks the position manager for unstaked NFTs and each configured gauge
//! for staked ones, discards closed (zero-liquidity) positions, and resolves
//! the backing pool, preferring the gauge's cached pool when the token pair
//! matches, falling back to the factory locator otherwise.

use alloy::primitives::{Address, U256};
use tracing::{debug, warn};

use crate::core::pool_locator::find_pool;
use crate::core::tick_math::percent_out;
use crate::core::token_cache::{ChainCache, PoolMeta};
use crate::errors::BotError;
use crate::execution::contracts::{ICLPool, IGauge, IPositionManager};
use crate::execution::tx_submitter::HttpProvider;
use crate::types::{LpPosition, PositionStatus, TickRange};

/// Structural gauge attributes, read once per cycle and cached.
#[derive(Debug, Clone, Copy)]
pub struct GaugeInfo {
    pub address: Address,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
}

pub struct PositionReader {
    provider: HttpProvider,
    cache: std::sync::Arc<ChainCache>,
    position_manager: Address,
    gauges: Vec<Address>,
    factories: Vec<Address>,
    fee_tiers: Vec<u32>,
}

impl PositionReader {
    pub fn new(
        provider: HttpProvider,
        cache: std::sync::Arc<ChainCache>,
        position_manager: Address,
        gauges: Vec<Address>,
        factories: Vec<Address>,
        fee_tiers: Vec<u32>,
    ) -> Self {
        Self {
            provider,
            cache,
            position_manager,
            gauges,
            factories,
            fee_tiers,
        }
    }

    // -----------------------------------------------------------------------
    // Gauge metadata
    // -----------------------------------------------------------------------

    /// Read each configured gauge's pool and token pair, seeding the pool
    /// cache as a side effect. Unreachable gauges are skipped for the cycle.
    pub async fn gauge_infos(&self) -> Vec<GaugeInfo> {
        let mut infos = Vec::with_capacity(self.gauges.len());
        for &address in &self.gauges {
            let gauge = IGauge::new(address, self.provider.clone());
            let pool = match gauge.pool().call().await {
                Ok(p) => p,
                Err(e) => {
                    warn!(gauge = %address, error = %e, "gauge unreachable, skipping this cycle");
                    continue;
                }
            };
            let (token0, token1) =
                match futures::future::join(gauge.token0().call(), gauge.token1().call()).await {
                    (Ok(t0), Ok(t1)) => (t0, t1),
                    _ => {
                        warn!(gauge = %address, "gauge token pair unreadable, skipping");
                        continue;
                    }
                };

            // Prefetch the pool's structural fields into the shared cache.
            if let Err(e) = self.cache.pool(pool).await {
                debug!(pool = %pool, error = %e, "pool metadata prefetch failed");
            }

            infos.push(GaugeInfo {
                address,
                pool,
                token0,
                token1,
            });
        }
        infos
    }

    // -----------------------------------------------------------------------
    // Enumeration
    // -----------------------------------------------------------------------

    /// Unstaked LP NFTs held directly by `owner`.
    pub async fn unstaked_positions(&self, owner: Address) -> Result<Vec<LpPosition>, BotError> {
        let manager = IPositionManager::new(self.position_manager, self.provider.clone());
        let balance = manager.balanceOf(owner).call().await?;
        let count = u64::try_from(balance).unwrap_or(0);

        let mut positions = Vec::new();
        for index in 0..count {
            let token_id = manager
                .tokenOfOwnerByIndex(owner, U256::from(index))
                .call()
                .await?;
            if let Some(position) = self.fetch_position(token_id, owner, None).await? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Staked LP NFTs custodied by the given gauges on behalf of `owner`.
    ///
    /// Prefers the bulk `stakedValues` accessor; falls back to
    /// `stakedLength` + `stakedByIndex` when a gauge lacks it.
    pub async fn staked_positions(
        &self,
        owner: Address,
        gauges: &[GaugeInfo],
    ) -> Result<Vec<LpPosition>, BotError> {
        let mut positions = Vec::new();
        for info in gauges {
            let gauge = IGauge::new(info.address, self.provider.clone());

            let token_ids: Vec<U256> = match gauge.stakedValues(owner).call().await {
                Ok(ids) => ids,
                Err(e) => {
                    debug!(gauge = %info.address, error = %e, "stakedValues unavailable, using index fallback");
                    let length = gauge.stakedLength(owner).call().await?;
                    let count = u64::try_from(length).unwrap_or(0);
                    let mut ids = Vec::with_capacity(count as usize);
                    for index in 0..count {
                        ids.push(
                            gauge
                                .stakedByIndex(owner, U256::from(index))
                                .call()
                                .await?,
                        );
                    }
                    ids
                }
            };

            for token_id in token_ids {
                if let Some(position) = self
                    .fetch_position(token_id, owner, Some(info.address))
                    .await?
                {
                    positions.push(position);
                }
            }
        }
        Ok(positions)
    }

    /// Position struct from the manager; `None` when the position is closed.
    async fn fetch_position(
        &self,
        token_id: U256,
        owner: Address,
        gauge: Option<Address>,
    ) -> Result<Option<LpPosition>, BotError> {
        let manager = IPositionManager::new(self.position_manager, self.provider.clone());
        let raw = manager.positions(token_id).call().await?;

        if raw.liquidity == 0 {
            return Ok(None);
        }

        Ok(Some(LpPosition {
            token_id,
            owner,
            manager: self.position_manager,
            token0: raw.token0,
            token1: raw.token1,
            tick_spacing: i32::try_from(raw.tickSpacing).unwrap_or(0),
            range: TickRange {
                lower: i32::try_from(raw.tickLower).unwrap_or(0),
                upper: i32::try_from(raw.tickUpper).unwrap_or(0),
            },
            liquidity: raw.liquidity,
            tokens_owed0: raw.tokensOwed0,
            tokens_owed1: raw.tokensOwed1,
            gauge,
            pool: None,
        }))
    }

    // -----------------------------------------------------------------------
    // Pool resolution & classification
    // -----------------------------------------------------------------------

    /// Resolve the position's pool: a gauge whose pair matches wins,
    /// otherwise the factory locator runs. `None` leaves the position
    /// unclassifiable for this cycle.
    pub async fn resolve_pool(
        &self,
        position: &LpPosition,
        gauges: &[GaugeInfo],
    ) -> Option<Address> {
        for info in gauges {
            if pair_matches(info, position.token0, position.token1) {
                return Some(info.pool);
            }
        }
        find_pool(
            &self.provider,
            &self.factories,
            &self.fee_tiers,
            position.token0,
            position.token1,
        )
        .await
    }

    /// Pool lookup for an arbitrary pair via the configured factories.
    pub async fn locate_pool(&self, token_a: Address, token_b: Address) -> Option<Address> {
        find_pool(
            &self.provider,
            &self.factories,
            &self.fee_tiers,
            token_a,
            token_b,
        )
        .await
    }

    /// Current `(sqrtPriceX96, tick)` for a pool.
    pub async fn slot0(&self, pool: Address) -> Result<(U256, i32), BotError> {
        let contract = ICLPool::new(pool, self.provider.clone());
        let slot0 = contract.slot0().call().await?;
        Ok((
            U256::from(slot0.sqrtPriceX96),
            i32::try_from(slot0.tick).unwrap_or(0),
        ))
    }

    /// Structural pool metadata via the shared cache.
    pub async fn pool_meta(&self, pool: Address) -> Result<PoolMeta, BotError> {
        self.cache.pool(pool).await
    }

    /// Claimable reward for a staked NFT; best-effort, diagnostics only.
    pub async fn earned(&self, gauge: Address, owner: Address, token_id: U256) -> Option<U256> {
        IGauge::new(gauge, self.provider.clone())
            .earned(owner, token_id)
            .call()
            .await
            .ok()
    }
}

/// Gauge pair match, orientation-insensitive.
fn pair_matches(info: &GaugeInfo, token0: Address, token1: Address) -> bool {
    (info.token0 == token0 && info.token1 == token1)
        || (info.token0 == token1 && info.token1 == token0)
}

/// Classify a position against the current tick.
pub fn classify(range: TickRange, current_tick: i32) -> PositionStatus {
    PositionStatus {
        current_tick,
        in_range: range.contains(current_tick),
        percent_out: percent_out(range, current_tick),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge(t0: u8, t1: u8) -> GaugeInfo {
        GaugeInfo {
            address: Address::repeat_byte(0xaa),
            pool: Address::repeat_byte(0xbb),
            token0: Address::repeat_byte(t0),
            token1: Address::repeat_byte(t1),
        }
    }

    #[test]
    fn pair_match_ignores_orientation() {
        let info = gauge(0x01, 0x02);
        assert!(pair_matches(
            &info,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02)
        ));
        assert!(pair_matches(
            &info,
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x01)
        ));
        assert!(!pair_matches(
            &info,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x03)
        ));
    }

    #[test]
    fn classification_boundaries() {
        let range = TickRange {
            lower: -120,
            upper: 120,
        };

        // Lower bound is inclusive, upper exclusive.
        assert!(classify(range, -120).in_range);
        assert!(classify(range, 119).in_range);
        assert!(!classify(range, 120).in_range);
        assert_eq!(classify(range, 0).percent_out, 0.0);

        // 240 ticks above a width-240 range.
        let drifted = classify(range, 360);
        assert!(!drifted.in_range);
        assert!((drifted.percent_out - 100.0).abs() < 1e-12);
    }
}
