//! Rebalance state machine: dismantle an out-of-range position and recreate
//! it around the current price.
//!
//! Stages run strictly in order: Unstaking → Withdrawing → ReadingBalances →
//! ComputingRatio → Swapping → Minting → Staking. The descriptor's stage is
//! advanced *before* the action it names begins, so an interruption at stage
//! X means "X may or may not have happened" and the next monitor cycle
//! re-derives the truth from the chain.
//!
//! At most one descriptor is alive at a time; the single-flight latch is the
//! only concurrency primitive the keeper uses to serialize rebalances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use rust_decimal::prelude::ToPrimitive;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::tick_math::{compute_new_range, human_price, ratio_for_range};
use crate::core::token_cache::ChainCache;
use crate::errors::BotError;
use crate::execution::contracts::{ICLPool, IERC20, IGauge, IPositionManager};
use crate::execution::swapper::{
    amount_out_minimum, ensure_erc20_allowance, ApprovalCache, PoolHint, SwapExecutor,
};
use crate::execution::tx_submitter::{HttpProvider, TxSubmitter};
use crate::types::{LpPosition, RangeRatio, SwapPlan, TickRange};

// ---------------------------------------------------------------------------
// Stages & descriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Starting,
    Unstaking,
    Withdrawing,
    ReadingBalances,
    ComputingRatio,
    Swapping,
    Minting,
    Staking,
    Done,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Starting => "Starting",
            Stage::Unstaking => "Unstaking",
            Stage::Withdrawing => "Withdrawing",
            Stage::ReadingBalances => "ReadingBalances",
            Stage::ComputingRatio => "ComputingRatio",
            Stage::Swapping => "Swapping",
            Stage::Minting => "Minting",
            Stage::Staking => "Staking",
            Stage::Done => "Done",
        }
    }
}

/// Working memory for one migration. Destroyed on Done or when an
/// unrecoverable error terminates the cycle; never persisted.
pub struct RebalanceDescriptor {
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub gauge: Option<Address>,
    pub target: TickRange,
    /// Absent on the bootstrap path, which enters at ComputingRatio.
    pub source: Option<LpPosition>,
    pub stage: Stage,
    pub balances: Option<(U256, U256)>,
    pub current_tick: Option<i32>,
    pub ratio: Option<RangeRatio>,
    pub tx_hashes: Vec<(&'static str, B256)>,
}

impl RebalanceDescriptor {
    fn record(&mut self, stage: &'static str, tx_hash: B256) {
        self.tx_hashes.push((stage, tx_hash));
    }
}

/// What a begin attempt observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceOutcome {
    Completed { token_id: U256 },
    /// Another descriptor was already alive.
    Skipped,
}

// ---------------------------------------------------------------------------
// Single-flight latch
// ---------------------------------------------------------------------------

/// Admits one holder at a time; release happens on guard drop.
pub(crate) struct SingleFlight(AtomicBool);

pub(crate) struct FlightGuard<'a>(&'a AtomicBool);

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub(crate) fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.0))
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Swap plan (pure)
// ---------------------------------------------------------------------------

/// Decide the swap that moves wallet balances onto the target ratio.
///
/// Out-of-range targets need a single-sided wallet, so the whole opposite
/// balance is swapped. In range, the value imbalance is measured in token1
/// units and only acted on above `min_swap_value`.
#[allow(clippy::too_many_arguments)]
pub fn plan_swap(
    token0: Address,
    token1: Address,
    balance0: U256,
    balance1: U256,
    dec0: u8,
    dec1: u8,
    price: f64,
    ratio: RangeRatio,
    min_swap_value: f64,
) -> SwapPlan {
    if !ratio.in_range {
        return if ratio.below_range {
            // Target needs only token0.
            SwapPlan::Swap {
                token_in: token1,
                token_out: token0,
                amount_in: balance1,
            }
        } else {
            SwapPlan::Swap {
                token_in: token0,
                token_out: token1,
                amount_in: balance0,
            }
        };
    }

    let human0 = u256_to_f64(balance0) / 10_f64.powi(dec0 as i32);
    let human1 = u256_to_f64(balance1) / 10_f64.powi(dec1 as i32);

    let value0 = human0 * price;
    let value1 = human1;
    let total = value0 + value1;
    let delta = value0 - total * ratio.token0_ratio;

    if delta.abs() < min_swap_value {
        return SwapPlan::Skip;
    }

    if delta > 0.0 {
        // Excess token0 value; sell the surplus.
        let amount_human = delta / price;
        let amount_in = f64_to_u256(amount_human * 10_f64.powi(dec0 as i32)).min(balance0);
        SwapPlan::Swap {
            token_in: token0,
            token_out: token1,
            amount_in,
        }
    } else {
        let amount_in = f64_to_u256(-delta * 10_f64.powi(dec1 as i32)).min(balance1);
        SwapPlan::Swap {
            token_in: token1,
            token_out: token0,
            amount_in,
        }
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

fn f64_to_u256(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from(value as u128)
}

// ---------------------------------------------------------------------------
// Rebalancer
// ---------------------------------------------------------------------------

pub struct Rebalancer {
    provider: HttpProvider,
    submitter: Arc<TxSubmitter>,
    swapper: Arc<dyn SwapExecutor>,
    cache: Arc<ChainCache>,
    approvals: ApprovalCache,
    config: Config,
    flight: SingleFlight,
}

impl Rebalancer {
    pub fn new(
        provider: HttpProvider,
        submitter: Arc<TxSubmitter>,
        swapper: Arc<dyn SwapExecutor>,
        cache: Arc<ChainCache>,
        config: Config,
    ) -> Self {
        Self {
            provider,
            submitter,
            swapper,
            cache,
            approvals: ApprovalCache::default(),
            config,
            flight: SingleFlight::new(),
        }
    }

    /// Whether a descriptor is currently alive.
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Migrate `position` into `target`. Requires the position's pool to be
    /// resolved.
    pub async fn rebalance(
        &self,
        position: LpPosition,
        target: TickRange,
        gauge: Option<Address>,
    ) -> Result<RebalanceOutcome, BotError> {
        let Some(_guard) = self.flight.try_acquire() else {
            info!("rebalance already in progress, skipping");
            return Ok(RebalanceOutcome::Skipped);
        };

        let pool = position.pool.ok_or_else(|| BotError::PoolNotFound {
            token0: format!("{:#x}", position.token0),
            token1: format!("{:#x}", position.token1),
        })?;

        let mut descriptor = RebalanceDescriptor {
            pool,
            token0: position.token0,
            token1: position.token1,
            tick_spacing: position.tick_spacing,
            gauge: gauge.or(position.gauge),
            target,
            source: Some(position),
            stage: Stage::Starting,
            balances: None,
            current_tick: None,
            ratio: None,
            tx_hashes: Vec::new(),
        };

        self.drive(&mut descriptor).await
    }

    /// One-shot create-then-stake from wallet balances: the degenerate entry
    /// into the machine at ComputingRatio.
    pub async fn bootstrap(
        &self,
        pool: Address,
        gauge: Option<Address>,
    ) -> Result<RebalanceOutcome, BotError> {
        let Some(_guard) = self.flight.try_acquire() else {
            info!("rebalance already in progress, skipping bootstrap");
            return Ok(RebalanceOutcome::Skipped);
        };

        let meta = self.cache.pool(pool).await?;
        let (_, tick) = self.slot0(pool).await?;
        let target = compute_new_range(tick, meta.tick_spacing, self.config.range_multiplier)?;

        info!(
            %pool,
            tick,
            target = %target,
            "bootstrapping a position from wallet balances"
        );

        let mut descriptor = RebalanceDescriptor {
            pool,
            token0: meta.token0,
            token1: meta.token1,
            tick_spacing: meta.tick_spacing,
            gauge,
            target,
            source: None,
            stage: Stage::ComputingRatio,
            balances: None,
            current_tick: None,
            ratio: None,
            tx_hashes: Vec::new(),
        };

        self.drive(&mut descriptor).await
    }

    // -----------------------------------------------------------------------
    // Stage driver
    // -----------------------------------------------------------------------

    async fn drive(&self, d: &mut RebalanceDescriptor) -> Result<RebalanceOutcome, BotError> {
        let result = self.run_stages(d).await;
        match &result {
            Ok(RebalanceOutcome::Completed { token_id }) => {
                info!(token_id = %token_id, target = %d.target, "rebalance complete");
            }
            Ok(RebalanceOutcome::Skipped) => {}
            Err(e) => {
                error!(
                    stage = d.stage.name(),
                    error = %e,
                    tx_hashes = ?d.tx_hashes,
                    "rebalance failed, next cycle re-derives state from chain"
                );
            }
        }
        result
    }

    async fn run_stages(&self, d: &mut RebalanceDescriptor) -> Result<RebalanceOutcome, BotError> {
        if let Some(source) = d.source.clone() {
            if source.is_staked() {
                d.stage = Stage::Unstaking;
                self.unstake(d, &source).await;
                tokio::time::sleep(self.config.settle_after_unstake).await;
            }

            d.stage = Stage::Withdrawing;
            self.withdraw(d, &source)
                .await
                .map_err(|e| e.at_stage("Withdrawing"))?;
            tokio::time::sleep(self.config.settle_after_withdraw).await;
        }

        d.stage = Stage::ReadingBalances;
        let balances = self
            .read_balances(d.token0, d.token1)
            .await
            .map_err(|e| e.at_stage("ReadingBalances"))?;
        d.balances = Some(balances);

        d.stage = Stage::ComputingRatio;
        let (_, tick) = self
            .slot0(d.pool)
            .await
            .map_err(|e| e.at_stage("ComputingRatio"))?;
        d.current_tick = Some(tick);
        let (dec0, dec1) = self
            .pair_decimals(d)
            .await
            .map_err(|e| e.at_stage("ComputingRatio"))?;
        d.ratio = Some(ratio_for_range(tick, d.target, dec0, dec1));

        d.stage = Stage::Swapping;
        self.swap_stage(d, dec0, dec1)
            .await
            .map_err(|e| e.at_stage("Swapping"))?;

        d.stage = Stage::Minting;
        let token_id = self.mint(d).await.map_err(|e| e.at_stage("Minting"))?;

        d.stage = Stage::Staking;
        self.stake(d, token_id).await;

        d.stage = Stage::Done;
        Ok(RebalanceOutcome::Completed { token_id })
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Unstake from the gauge. A transient failure here is logged and the
    /// machine continues: the NFT may already have left the gauge, and the
    /// withdraw call surfaces any real custody problem.
    async fn unstake(&self, d: &mut RebalanceDescriptor, source: &LpPosition) {
        let Some(gauge) = source.gauge else { return };

        let calldata = IGauge::withdrawCall {
            tokenId: source.token_id,
        }
        .abi_encode();
        let tx = self.tx_to(gauge, calldata);

        match self.submitter.submit_and_wait(tx).await {
            Ok(receipt) => {
                d.record("Unstaking", receipt.transaction_hash);
                info!(token_id = %source.token_id, "unstaked from gauge");
            }
            Err(e) => {
                warn!(
                    token_id = %source.token_id,
                    error = %e,
                    "unstake failed, continuing to withdraw, which will surface a real problem"
                );
            }
        }
    }

    /// Atomically decrease all liquidity, collect everything owed, and burn,
    /// via the manager's multicall.
    async fn withdraw(
        &self,
        d: &mut RebalanceDescriptor,
        source: &LpPosition,
    ) -> Result<(), BotError> {
        let account = self.submitter.signer_address();

        let decrease = IPositionManager::decreaseLiquidityCall {
            params: IPositionManager::DecreaseLiquidityParams {
                tokenId: source.token_id,
                liquidity: source.liquidity,
                amount0Min: U256::ZERO,
                amount1Min: U256::ZERO,
                deadline: U256::MAX,
            },
        }
        .abi_encode();

        let collect = IPositionManager::collectCall {
            params: IPositionManager::CollectParams {
                tokenId: source.token_id,
                recipient: account,
                amount0Max: u128::MAX,
                amount1Max: u128::MAX,
            },
        }
        .abi_encode();

        let burn = IPositionManager::burnCall {
            tokenId: source.token_id,
        }
        .abi_encode();

        let calldata = IPositionManager::multicallCall {
            data: vec![decrease.into(), collect.into(), burn.into()],
        }
        .abi_encode();

        let tx = self.tx_to(source.manager, calldata);
        let receipt = self.submitter.submit_and_wait(tx).await?;
        d.record("Withdrawing", receipt.transaction_hash);
        info!(token_id = %source.token_id, "position withdrawn and burned");
        Ok(())
    }

    async fn read_balances(
        &self,
        token0: Address,
        token1: Address,
    ) -> Result<(U256, U256), BotError> {
        let account = self.submitter.signer_address();
        let erc0 = IERC20::new(token0, self.provider.clone());
        let erc1 = IERC20::new(token1, self.provider.clone());
        let (balance0, balance1) =
            futures::future::join(erc0.balanceOf(account).call(), erc1.balanceOf(account).call())
                .await;
        Ok((balance0?, balance1?))
    }

    async fn pair_decimals(&self, d: &RebalanceDescriptor) -> Result<(u8, u8), BotError> {
        let meta0 = self.cache.token(d.token0).await?;
        let meta1 = self.cache.token(d.token1).await?;
        Ok((meta0.decimals, meta1.decimals))
    }

    async fn swap_stage(
        &self,
        d: &mut RebalanceDescriptor,
        dec0: u8,
        dec1: u8,
    ) -> Result<(), BotError> {
        let (balance0, balance1) = d.balances.expect("balances read before Swapping");
        let ratio = d.ratio.expect("ratio computed before Swapping");
        let tick = d.current_tick.expect("tick read before Swapping");
        let price = human_price(tick, dec0, dec1);
        let min_swap_value = self.config.min_swap_value_usdc.to_f64().unwrap_or(0.0);

        let plan = plan_swap(
            d.token0,
            d.token1,
            balance0,
            balance1,
            dec0,
            dec1,
            price,
            ratio,
            min_swap_value,
        );

        let SwapPlan::Swap {
            token_in,
            token_out,
            amount_in,
        } = plan
        else {
            info!(
                %balance0,
                %balance1,
                "imbalance below swap threshold, minting with wallet amounts as read"
            );
            return Ok(());
        };

        let hint = self
            .cache
            .pool(d.pool)
            .await
            .ok()
            .and_then(|meta| meta.fee)
            .map(|fee| PoolHint { fee });

        info!(%token_in, %token_out, %amount_in, "executing rebalance swap");
        let receipt = self
            .swapper
            .swap(token_in, token_out, amount_in, hint)
            .await?;

        if let Some(receipt) = receipt {
            d.record("Swapping", receipt.tx_hash);
            tokio::time::sleep(self.config.settle_after_swap).await;
            d.balances = Some(self.read_balances(d.token0, d.token1).await?);
        }
        Ok(())
    }

    /// Approve both tokens to the manager, static-call the mint to surface
    /// the revert reason, then submit for real and extract the new tokenId.
    async fn mint(&self, d: &mut RebalanceDescriptor) -> Result<U256, BotError> {
        let account = self.submitter.signer_address();
        let (amount0, amount1) = d.balances.expect("balances read before Minting");

        for (token, amount) in [(d.token0, amount0), (d.token1, amount1)] {
            if amount.is_zero() {
                continue;
            }
            ensure_erc20_allowance(
                &self.provider,
                &self.submitter,
                &self.approvals,
                token,
                self.config.position_manager,
                amount,
            )
            .await?;
        }

        let calldata = IPositionManager::mintCall {
            params: IPositionManager::MintParams {
                token0: d.token0,
                token1: d.token1,
                tickSpacing: d.tick_spacing.try_into().unwrap_or_default(),
                tickLower: d.target.lower.try_into().unwrap_or_default(),
                tickUpper: d.target.upper.try_into().unwrap_or_default(),
                amount0Desired: amount0,
                amount1Desired: amount1,
                amount0Min: amount_out_minimum(amount0, self.config.slippage_bps),
                amount1Min: amount_out_minimum(amount1, self.config.slippage_bps),
                recipient: account,
                deadline: U256::MAX,
            },
        }
        .abi_encode();

        let tx = self.tx_to(self.config.position_manager, calldata);

        // Static-call first so a revert reason is surfaced before spending gas.
        self.submitter
            .simulate(&tx)
            .await
            .map_err(|e| BotError::MintReverted {
                reason: e.to_string(),
            })?;

        let receipt =
            self.submitter
                .submit_and_wait(tx)
                .await
                .map_err(|e| BotError::MintReverted {
                    reason: e.to_string(),
                })?;
        d.record("Minting", receipt.transaction_hash);

        parse_minted_token_id(&receipt, account).ok_or_else(|| BotError::MintReverted {
            reason: "mint confirmed but no IncreaseLiquidity/Transfer event found".into(),
        })
    }

    /// Stake into the gauge. Failure is logged but never fatal: the fresh
    /// position exists and is valuable even unstaked.
    async fn stake(&self, d: &mut RebalanceDescriptor, token_id: U256) {
        let Some(gauge) = d.gauge else {
            info!(token_id = %token_id, "no gauge configured for pool, leaving unstaked");
            return;
        };

        if let Err(e) = self.stake_inner(d, gauge, token_id).await {
            warn!(
                token_id = %token_id,
                gauge = %gauge,
                error = %e,
                "staking failed, position left unstaked; auto-stake will retry next cycle"
            );
        }
    }

    async fn stake_inner(
        &self,
        d: &mut RebalanceDescriptor,
        gauge: Address,
        token_id: U256,
    ) -> Result<(), BotError> {
        let hashes = stake_nft(
            &self.provider,
            &self.submitter,
            self.config.position_manager,
            gauge,
            token_id,
        )
        .await?;
        for hash in hashes {
            d.record("Staking", hash);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chain helpers
    // -----------------------------------------------------------------------

    async fn slot0(&self, pool: Address) -> Result<(U256, i32), BotError> {
        let contract = ICLPool::new(pool, self.provider.clone());
        let slot0 = contract.slot0().call().await?;
        Ok((
            U256::from(slot0.sqrtPriceX96),
            i32::try_from(slot0.tick).unwrap_or(0),
        ))
    }

    fn tx_to(&self, to: Address, calldata: Vec<u8>) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.submitter.signer_address())
            .with_to(to)
            .with_input(Bytes::from(calldata))
    }
}

/// Approve the gauge for the NFT if needed (idempotent) and deposit it.
/// Shared by the Staking stage and the monitor's auto-stake action.
pub async fn stake_nft(
    provider: &HttpProvider,
    submitter: &TxSubmitter,
    position_manager: Address,
    gauge: Address,
    token_id: U256,
) -> Result<Vec<B256>, BotError> {
    let mut hashes = Vec::new();
    let manager = IPositionManager::new(position_manager, provider.clone());

    let approved = manager.getApproved(token_id).call().await?;
    if approved != gauge {
        let calldata = IPositionManager::approveCall {
            to: gauge,
            tokenId: token_id,
        }
        .abi_encode();
        let tx = TransactionRequest::default()
            .with_from(submitter.signer_address())
            .with_to(position_manager)
            .with_input(Bytes::from(calldata));
        let receipt = submitter.submit_and_wait(tx).await?;
        hashes.push(receipt.transaction_hash);
    }

    let calldata = IGauge::depositCall { tokenId: token_id }.abi_encode();
    let tx = TransactionRequest::default()
        .with_from(submitter.signer_address())
        .with_to(gauge)
        .with_input(Bytes::from(calldata));
    let receipt = submitter.submit_and_wait(tx).await?;
    hashes.push(receipt.transaction_hash);

    info!(token_id = %token_id, gauge = %gauge, "position staked");
    Ok(hashes)
}

/// New tokenId from a mint receipt: prefer `IncreaseLiquidity`, fall back to
/// the ERC-721 `Transfer` from the zero address.
fn parse_minted_token_id(receipt: &TransactionReceipt, recipient: Address) -> Option<U256> {
    for log in receipt.inner.logs() {
        if let Ok(event) = IPositionManager::IncreaseLiquidity::decode_log_data(log.data(), true) {
            return Some(event.tokenId);
        }
    }
    for log in receipt.inner.logs() {
        if let Ok(event) = IPositionManager::Transfer::decode_log_data(log.data(), true) {
            if event.from == Address::ZERO && event.to == recipient {
                return Some(event.tokenId);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn in_range_ratio(token0_ratio: f64) -> RangeRatio {
        RangeRatio {
            token0_ratio,
            token1_ratio: 1.0 - token0_ratio,
            in_range: true,
            below_range: false,
        }
    }

    // -- single flight ------------------------------------------------------

    #[test]
    fn second_acquire_observes_busy() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().expect("first acquire succeeds");
        assert!(flight.is_busy());
        assert!(flight.try_acquire().is_none());
        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.try_acquire().is_some());
    }

    // -- swap planning ------------------------------------------------------

    #[test]
    fn below_range_swaps_all_token1() {
        let ratio = RangeRatio {
            token0_ratio: 1.0,
            token1_ratio: 0.0,
            in_range: false,
            below_range: true,
        };
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::from(5u64),
            U256::from(50_000_000u64),
            9,
            6,
            0.001,
            ratio,
            20.0,
        );
        assert_eq!(
            plan,
            SwapPlan::Swap {
                token_in: addr(2),
                token_out: addr(1),
                amount_in: U256::from(50_000_000u64),
            }
        );
    }

    #[test]
    fn above_range_swaps_all_token0() {
        let ratio = RangeRatio {
            token0_ratio: 0.0,
            token1_ratio: 1.0,
            in_range: false,
            below_range: false,
        };
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::from(1_234_500_000u64),
            U256::ZERO,
            9,
            6,
            0.001,
            ratio,
            20.0,
        );
        assert_eq!(
            plan,
            SwapPlan::Swap {
                token_in: addr(1),
                token_out: addr(2),
                amount_in: U256::from(1_234_500_000u64),
            }
        );
    }

    #[test]
    fn dust_imbalance_skips_swap() {
        // Balanced target, $12 imbalance against a $20 floor.
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::from(62_000_000u64), // 62 @ 6 decimals
            U256::from(38_000_000u64), // 38 @ 6 decimals
            6,
            6,
            1.0,
            in_range_ratio(0.5),
            20.0,
        );
        // delta = 62 - 100·0.5 = 12 < 20
        assert_eq!(plan, SwapPlan::Skip);
    }

    #[test]
    fn excess_token0_sold_in_range() {
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::from(80_000_000u64), // 80
            U256::from(20_000_000u64), // 20
            6,
            6,
            1.0,
            in_range_ratio(0.5),
            20.0,
        );
        // delta = 80 - 50 = 30 ≥ 20 → sell 30 token0
        assert_eq!(
            plan,
            SwapPlan::Swap {
                token_in: addr(1),
                token_out: addr(2),
                amount_in: U256::from(30_000_000u64),
            }
        );
    }

    #[test]
    fn excess_token1_sold_in_range() {
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::ZERO,
            U256::from(100_000_000u64),
            6,
            6,
            1.0,
            in_range_ratio(0.5),
            20.0,
        );
        // All value in token1; need 50 in token0 → swap 50 token1.
        assert_eq!(
            plan,
            SwapPlan::Swap {
                token_in: addr(2),
                token_out: addr(1),
                amount_in: U256::from(50_000_000u64),
            }
        );
    }

    #[test]
    fn swap_amount_clamped_to_balance() {
        // Price mismatch could ask for more token0 than held; clamp.
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::from(10_000_000u64),
            U256::ZERO,
            6,
            6,
            1.0,
            in_range_ratio(0.0),
            0.0,
        );
        match plan {
            SwapPlan::Swap { amount_in, .. } => {
                assert!(amount_in <= U256::from(10_000_000u64));
            }
            SwapPlan::Skip => panic!("expected a swap"),
        }
    }

    #[test]
    fn decimal_adjustment_in_value_math() {
        // 1.2345 token0 (9 dec) at price 40 → value ≈ 49.38; 50 token1 (6 dec).
        // Target 50/50 of 99.38 → delta ≈ -0.31, well under the $20 floor.
        let plan = plan_swap(
            addr(1),
            addr(2),
            U256::from(1_234_500_000u64),
            U256::from(50_000_000u64),
            9,
            6,
            40.0,
            in_range_ratio(0.5),
            20.0,
        );
        assert_eq!(plan, SwapPlan::Skip);
    }

    // -- stage names --------------------------------------------------------

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::Starting.name(), "Starting");
        assert_eq!(Stage::Minting.name(), "Minting");
        assert_eq!(Stage::Done.name(), "Done");
    }
}
