//! Per-cycle scan loop: read positions, classify, act.
//!
//! The monitor owns the periodic tick. Cycles never overlap: a latch skips
//! the fire if the previous cycle is somehow still running, and the next
//! fire is scheduled only after the current cycle returns. Everything the
//! monitor knows is re-derived from the chain each cycle; the only state
//! carried across cycles is the metadata cache and the in-flight rebalance
//! latch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use rust_decimal::prelude::ToPrimitive;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::positions::{classify, GaugeInfo, PositionReader};
use crate::core::rebalancer::{stake_nft, RebalanceOutcome, Rebalancer};
use crate::core::tick_math::compute_new_range;
use crate::core::token_cache::ChainCache;
use crate::errors::BotError;
use crate::execution::contracts::IERC20;
use crate::execution::tx_submitter::{HttpProvider, TxSubmitter};
use crate::types::LpPosition;

pub struct Monitor {
    provider: HttpProvider,
    reader: PositionReader,
    rebalancer: Arc<Rebalancer>,
    submitter: Arc<TxSubmitter>,
    cache: Arc<ChainCache>,
    config: Config,
    shutdown: CancellationToken,
    check_in_progress: AtomicBool,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: HttpProvider,
        reader: PositionReader,
        rebalancer: Arc<Rebalancer>,
        submitter: Arc<TxSubmitter>,
        cache: Arc<ChainCache>,
        config: Config,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            reader,
            rebalancer,
            submitter,
            cache,
            config,
            shutdown,
            check_in_progress: AtomicBool::new(false),
        }
    }

    /// Main loop. Runs until the CancellationToken is cancelled; each cycle
    /// runs to completion before the next fire is armed.
    pub async fn run(&self) -> Result<()> {
        info!(
            interval_ms = self.config.check_interval.as_millis() as u64,
            auto_rebalance = self.config.auto_rebalance,
            "monitor started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(self.config.check_interval) => {
                    if self.check_in_progress.swap(true, Ordering::AcqRel) {
                        warn!("previous cycle still running, skipping this fire");
                        continue;
                    }
                    if let Err(e) = self.scan_once().await {
                        warn!(error = %e, "cycle failed, retrying next tick");
                    }
                    self.check_in_progress.store(false, Ordering::Release);
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // One cycle
    // -----------------------------------------------------------------------

    pub async fn scan_once(&self) -> Result<(), BotError> {
        let account = self.submitter.signer_address();

        // 1. Gauge metadata, once per cycle.
        let gauges = self.reader.gauge_infos().await;

        // 2–4. Enumerate open positions, staked and unstaked.
        let mut positions = self.reader.unstaked_positions(account).await?;
        positions.extend(self.reader.staked_positions(account, &gauges).await?);

        if positions.is_empty() {
            info!("no open positions");
            return self.maybe_bootstrap(&gauges).await;
        }

        // 5. Resolve pools; unresolvable positions are skipped this cycle.
        let mut resolved: Vec<LpPosition> = Vec::with_capacity(positions.len());
        for mut position in positions {
            match self.reader.resolve_pool(&position, &gauges).await {
                Some(pool) => {
                    position.pool = Some(pool);
                    resolved.push(position);
                }
                None => {
                    warn!(
                        token_id = %position.token_id,
                        token0 = %position.token0,
                        token1 = %position.token1,
                        "no pool found, position unclassifiable this cycle"
                    );
                }
            }
        }

        // 6. One slot0 read per distinct pool.
        let mut ticks: HashMap<Address, i32> = HashMap::new();
        for position in &resolved {
            let pool = position.pool.expect("pool resolved above");
            if let std::collections::hash_map::Entry::Vacant(entry) = ticks.entry(pool) {
                let (_, tick) = self.reader.slot0(pool).await?;
                entry.insert(tick);
            }
        }

        // 7. Classify and act. Shutdown is observed between positions so a
        // signal never interrupts a send mid-flight.
        for position in &resolved {
            if self.shutdown.is_cancelled() {
                return Err(BotError::Cancelled);
            }
            let pool = position.pool.expect("pool resolved above");
            let current_tick = ticks[&pool];
            let status = classify(position.range, current_tick);

            info!(
                token_id = %position.token_id,
                range = %position.range,
                current_tick,
                in_range = status.in_range,
                percent_out = format!("{:.1}", status.percent_out),
                staked = position.is_staked(),
                "position"
            );

            if let Some(gauge) = position.gauge {
                if let Some(reward) = self
                    .reader
                    .earned(gauge, account, position.token_id)
                    .await
                {
                    info!(token_id = %position.token_id, reward = %reward, "claimable reward");
                }
            }

            if status.in_range && !position.is_staked() {
                self.auto_stake(position, &gauges).await;
            } else if !status.in_range
                && status.percent_out >= self.config.rebalance_threshold_pct
            {
                self.maybe_rebalance(position, current_tick, &gauges).await;
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Stake an in-range unstaked NFT into the gauge matching its pair.
    /// Idempotent: once staked the position enumerates from the gauge and
    /// never re-enters this path.
    async fn auto_stake(&self, position: &LpPosition, gauges: &[GaugeInfo]) {
        let Some(gauge) = matching_gauge(gauges, position) else {
            return;
        };

        info!(token_id = %position.token_id, gauge = %gauge, "auto-staking in-range position");
        if let Err(e) = stake_nft(
            &self.provider,
            &self.submitter,
            self.config.position_manager,
            gauge,
            position.token_id,
        )
        .await
        {
            warn!(token_id = %position.token_id, error = %e, "auto-stake failed");
        }
    }

    async fn maybe_rebalance(
        &self,
        position: &LpPosition,
        current_tick: i32,
        gauges: &[GaugeInfo],
    ) {
        if !self.config.auto_rebalance {
            info!(
                token_id = %position.token_id,
                "out of range beyond threshold but AUTO_REBALANCE is disabled, not acting"
            );
            return;
        }
        if self.rebalancer.is_busy() {
            info!(token_id = %position.token_id, "rebalance in flight, skipping candidate");
            return;
        }

        let target = match compute_new_range(
            current_tick,
            position.tick_spacing,
            self.config.range_multiplier,
        ) {
            Ok(range) => range,
            Err(e) => {
                warn!(token_id = %position.token_id, error = %e, "cannot build target range");
                return;
            }
        };

        let gauge = position.gauge.or_else(|| matching_gauge(gauges, position));
        match self
            .rebalancer
            .rebalance(position.clone(), target, gauge)
            .await
        {
            Ok(RebalanceOutcome::Completed { token_id }) => {
                info!(old = %position.token_id, new = %token_id, "position migrated");
            }
            Ok(RebalanceOutcome::Skipped) => {}
            Err(e) => {
                warn!(token_id = %position.token_id, error = %e, "rebalance failed");
            }
        }
    }

    /// With zero open positions, create one from wallet balances, provided
    /// they clear the dust thresholds.
    async fn maybe_bootstrap(&self, gauges: &[GaugeInfo]) -> Result<(), BotError> {
        if !self.config.auto_rebalance {
            return Ok(());
        }
        if self.rebalancer.is_busy() {
            return Ok(());
        }

        let account = self.submitter.signer_address();
        let (balance0, human0) = self.human_balance(self.config.token0, account).await?;
        let (balance1, human1) = self.human_balance(self.config.token1, account).await?;

        let dust0 = self.config.dust_token0.to_f64().unwrap_or(0.0);
        let dust1 = self.config.dust_token1.to_f64().unwrap_or(0.0);
        if (balance0.is_zero() || human0 <= dust0) && (balance1.is_zero() || human1 <= dust1) {
            info!("wallet balances below dust thresholds, nothing to bootstrap");
            return Ok(());
        }

        let Some(pool) = self
            .reader
            .locate_pool(self.config.token0, self.config.token1)
            .await
        else {
            warn!("no pool for configured bootstrap pair");
            return Ok(());
        };

        let gauge = gauges
            .iter()
            .find(|info| info.pool == pool)
            .map(|info| info.address);

        match self.rebalancer.bootstrap(pool, gauge).await {
            Ok(RebalanceOutcome::Completed { token_id }) => {
                info!(token_id = %token_id, "bootstrapped new position");
            }
            Ok(RebalanceOutcome::Skipped) => {}
            Err(e) => {
                warn!(error = %e, "bootstrap failed");
            }
        }
        Ok(())
    }

    async fn human_balance(
        &self,
        token: Address,
        account: Address,
    ) -> Result<(U256, f64), BotError> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let balance = erc20.balanceOf(account).call().await?;
        let meta = self.cache.token(token).await?;
        let human = balance.to_string().parse::<f64>().unwrap_or(0.0)
            / 10_f64.powi(meta.decimals as i32);
        Ok((balance, human))
    }
}

/// Gauge whose token pair matches the position's, in either orientation.
fn matching_gauge(gauges: &[GaugeInfo], position: &LpPosition) -> Option<Address> {
    gauges
        .iter()
        .find(|info| {
            (info.token0 == position.token0 && info.token1 == position.token1)
                || (info.token0 == position.token1 && info.token1 == position.token0)
        })
        .map(|info| info.address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TickRange;

    fn position(t0: u8, t1: u8) -> LpPosition {
        LpPosition {
            token_id: U256::from(1u64),
            owner: Address::repeat_byte(0xee),
            manager: Address::repeat_byte(0xef),
            token0: Address::repeat_byte(t0),
            token1: Address::repeat_byte(t1),
            tick_spacing: 60,
            range: TickRange {
                lower: -120,
                upper: 120,
            },
            liquidity: 1,
            tokens_owed0: 0,
            tokens_owed1: 0,
            gauge: None,
            pool: None,
        }
    }

    #[test]
    fn gauge_matching_respects_pair() {
        let gauges = vec![GaugeInfo {
            address: Address::repeat_byte(0xaa),
            pool: Address::repeat_byte(0xbb),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
        }];

        assert_eq!(
            matching_gauge(&gauges, &position(0x01, 0x02)),
            Some(Address::repeat_byte(0xaa))
        );
        assert_eq!(
            matching_gauge(&gauges, &position(0x02, 0x01)),
            Some(Address::repeat_byte(0xaa))
        );
        assert_eq!(matching_gauge(&gauges, &position(0x01, 0x03)), None);
    }
}
