//! Swap execution: aggregator route and direct on-chain router variants.
//!
//! Both variants satisfy the same contract: either return a confirmed
//! receipt whose realized output met the minimum bound, or fail. A zero
//! input returns `None` so callers can treat "no swap performed" explicitly.
//!
//! Approvals are cached per (token, spender) so a long-running keeper only
//! pays for them once. The aggregator path runs the two-step Permit2
//! allowance; the direct path approves the router on the token itself.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, Uint, U256};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{BPS_DENOMINATOR, PERMIT2};
use crate::errors::BotError;
use crate::execution::aggregator::AggregatorClient;
use crate::execution::contracts::{IERC20, IPermit2, IQuoterV2, ISwapRouter};
use crate::execution::tx_submitter::{HttpProvider, TxSubmitter};
use crate::types::SwapReceipt;

/// Pool metadata a caller can pass to steer the direct variant.
#[derive(Debug, Clone, Copy)]
pub struct PoolHint {
    pub fee: u32,
}

/// Common capability set over the two swap paths.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Swap `amount_in` of `token_in` into `token_out`. Returns `None` when
    /// `amount_in` is zero (no swap performed).
    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        pool_hint: Option<PoolHint>,
    ) -> Result<Option<SwapReceipt>, BotError>;
}

// ---------------------------------------------------------------------------
// Shared arithmetic and checks
// ---------------------------------------------------------------------------

/// `amount · (10_000 − bps) / 10_000` in integer arithmetic.
pub fn amount_out_minimum(amount: U256, slippage_bps: u32) -> U256 {
    let bps = u64::from(slippage_bps).min(BPS_DENOMINATOR);
    amount * U256::from(BPS_DENOMINATOR - bps) / U256::from(BPS_DENOMINATOR)
}

/// Empty allowlist admits every router; otherwise membership is required.
pub fn router_allowed(allowlist: &[String], router: Address) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let needle = format!("{router:#x}");
    allowlist.iter().any(|r| r == &needle)
}

/// Sum ERC-20 `Transfer` amounts of `token` landing on `recipient`, the
/// realized output of a confirmed swap.
fn amount_out_from_logs(
    receipt: &TransactionReceipt,
    token: Address,
    recipient: Address,
) -> Option<U256> {
    let mut total = U256::ZERO;
    let mut seen = false;
    for log in receipt.inner.logs() {
        if log.address() != token {
            continue;
        }
        if let Ok(transfer) = IERC20::Transfer::decode_log_data(log.data(), true) {
            if transfer.to == recipient {
                total += transfer.value;
                seen = true;
            }
        }
    }
    seen.then_some(total)
}

/// Reclassify submission failures as swap-route failures so the retry
/// policy can match on revert markers.
fn as_route_error(err: BotError) -> BotError {
    match err {
        BotError::SimulationFailed { reason } => BotError::RouteReverted { reason },
        BotError::TxReverted { reason, tx_hash } => BotError::RouteReverted {
            reason: format!("{reason} (tx: {tx_hash})"),
        },
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Approval cache
// ---------------------------------------------------------------------------

/// Session-lifetime record of (token, spender) pairs already approved.
#[derive(Default)]
pub(crate) struct ApprovalCache {
    granted: Mutex<HashSet<(Address, Address)>>,
}

impl ApprovalCache {
    pub(crate) async fn contains(&self, token: Address, spender: Address) -> bool {
        self.granted.lock().await.contains(&(token, spender))
    }

    pub(crate) async fn insert(&self, token: Address, spender: Address) {
        self.granted.lock().await.insert((token, spender));
    }
}

/// Approve `spender` for `token` unless the cache or the chain already shows
/// a sufficient allowance.
pub(crate) async fn ensure_erc20_allowance(
    provider: &HttpProvider,
    submitter: &TxSubmitter,
    cache: &ApprovalCache,
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<(), BotError> {
    if cache.contains(token, spender).await {
        return Ok(());
    }

    let owner = submitter.signer_address();
    let erc20 = IERC20::new(token, provider.clone());
    let allowance = erc20.allowance(owner, spender).call().await?;
    if allowance >= amount {
        cache.insert(token, spender).await;
        return Ok(());
    }

    info!(%token, %spender, "sending ERC-20 approval");
    let calldata = IERC20::approveCall {
        spender,
        amount: U256::MAX,
    }
    .abi_encode();

    let tx = TransactionRequest::default()
        .with_from(owner)
        .with_to(token)
        .with_input(Bytes::from(calldata));
    submitter.submit_and_wait(tx).await?;
    cache.insert(token, spender).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Aggregator variant
// ---------------------------------------------------------------------------

/// Off-chain aggregator route: quote → build → send, with Permit2 two-step
/// allowance and a router allowlist.
pub struct AggregatorSwapper {
    client: AggregatorClient,
    provider: HttpProvider,
    submitter: Arc<TxSubmitter>,
    allowed_routers: Vec<String>,
    slippage_bps: u32,
    erc20_approvals: ApprovalCache,
    permit2_approvals: ApprovalCache,
}

impl AggregatorSwapper {
    pub fn new(
        client: AggregatorClient,
        provider: HttpProvider,
        submitter: Arc<TxSubmitter>,
        allowed_routers: Vec<String>,
        slippage_bps: u32,
    ) -> Self {
        Self {
            client,
            provider,
            submitter,
            allowed_routers,
            slippage_bps,
            erc20_approvals: ApprovalCache::default(),
            permit2_approvals: ApprovalCache::default(),
        }
    }

    async fn attempt(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<SwapReceipt, BotError> {
        let account = self.submitter.signer_address();

        // 1. Quote.
        let quote = self.client.get_route(token_in, token_out, amount_in).await?;
        if !router_allowed(&self.allowed_routers, quote.router) {
            return Err(BotError::UntrustedRouter {
                router: format!("{:#x}", quote.router),
            });
        }
        let min_out = amount_out_minimum(quote.amount_out, self.slippage_bps);
        debug!(amount_out = %quote.amount_out, %min_out, "aggregator quote accepted");

        // 2. Allowances: token → Permit2, then Permit2 → router.
        ensure_erc20_allowance(
            &self.provider,
            &self.submitter,
            &self.erc20_approvals,
            token_in,
            PERMIT2,
            amount_in,
        )
        .await?;
        self.ensure_permit2_allowance(token_in, quote.router, amount_in)
            .await?;

        // 3. Build. Router integrity against the quote is checked inside.
        let built = self
            .client
            .build_route(&quote, account, account, self.slippage_bps)
            .await?;

        // 4. Submit.
        let tx = TransactionRequest::default()
            .with_from(account)
            .with_to(built.router)
            .with_value(built.value)
            .with_input(Bytes::from(built.calldata));

        let receipt = self
            .submitter
            .submit_and_wait(tx)
            .await
            .map_err(as_route_error)?;

        let realized = amount_out_from_logs(&receipt, token_out, account);
        Ok(SwapReceipt {
            tx_hash: receipt.transaction_hash,
            amount_out: realized.unwrap_or(built.amount_out),
            gas_used: receipt.gas_used,
        })
    }

    /// Second allowance step: the router pulls through Permit2.
    async fn ensure_permit2_allowance(
        &self,
        token: Address,
        router: Address,
        amount: U256,
    ) -> Result<(), BotError> {
        if self.permit2_approvals.contains(token, router).await {
            return Ok(());
        }

        let owner = self.submitter.signer_address();
        let permit2 = IPermit2::new(PERMIT2, self.provider.clone());
        let current = permit2.allowance(owner, token, router).call().await?;
        let sufficient = match Uint::<160, 3>::try_from(amount) {
            Ok(needed) => current.amount >= needed,
            // Amount exceeds the u160 ledger range; re-approve to be sure.
            Err(_) => false,
        };
        if sufficient {
            self.permit2_approvals.insert(token, router).await;
            return Ok(());
        }

        info!(%token, %router, "sending Permit2 approval");
        let calldata = IPermit2::approveCall {
            token,
            spender: router,
            amount: Uint::<160, 3>::MAX,
            expiration: Uint::<48, 1>::MAX,
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .with_from(owner)
            .with_to(PERMIT2)
            .with_input(Bytes::from(calldata));
        self.submitter.submit_and_wait(tx).await?;
        self.permit2_approvals.insert(token, router).await;
        Ok(())
    }
}

#[async_trait]
impl SwapExecutor for AggregatorSwapper {
    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        _pool_hint: Option<PoolHint>,
    ) -> Result<Option<SwapReceipt>, BotError> {
        if amount_in.is_zero() {
            return Ok(None);
        }

        match self.attempt(token_in, token_out, amount_in).await {
            Ok(receipt) => Ok(Some(receipt)),
            Err(e) if e.is_retryable_swap() => {
                warn!(error = %e, "swap attempt failed, retrying once with a fresh quote");
                self.attempt(token_in, token_out, amount_in)
                    .await
                    .map(Some)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Direct variant
// ---------------------------------------------------------------------------

/// On-chain router path: static quoter call, then `exactInputSingle`.
pub struct DirectSwapper {
    provider: HttpProvider,
    submitter: Arc<TxSubmitter>,
    quoter: Address,
    router: Address,
    slippage_bps: u32,
    approvals: ApprovalCache,
}

impl DirectSwapper {
    pub fn new(
        provider: HttpProvider,
        submitter: Arc<TxSubmitter>,
        quoter: Address,
        router: Address,
        slippage_bps: u32,
    ) -> Self {
        Self {
            provider,
            submitter,
            quoter,
            router,
            slippage_bps,
            approvals: ApprovalCache::default(),
        }
    }

    async fn attempt(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        fee: u32,
    ) -> Result<SwapReceipt, BotError> {
        let account = self.submitter.signer_address();
        let fee_uint = Uint::<24, 1>::from(fee);

        // Static quote; the quoter is nonpayable but only ever eth_called.
        let quoter = IQuoterV2::new(self.quoter, self.provider.clone());
        let quoted = quoter
            .quoteExactInputSingle(IQuoterV2::QuoteExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                amountIn: amount_in,
                fee: fee_uint,
                sqrtPriceLimitX96: Uint::<160, 3>::ZERO,
            })
            .call()
            .await
            .map_err(|e| BotError::RouteReverted {
                reason: format!("quoter call failed: {e}"),
            })?;

        let min_out = amount_out_minimum(quoted.amountOut, self.slippage_bps);
        debug!(amount_out = %quoted.amountOut, %min_out, fee, "direct quote accepted");

        ensure_erc20_allowance(
            &self.provider,
            &self.submitter,
            &self.approvals,
            token_in,
            self.router,
            amount_in,
        )
        .await?;

        let calldata = ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                fee: fee_uint,
                recipient: account,
                amountIn: amount_in,
                amountOutMinimum: min_out,
                sqrtPriceLimitX96: Uint::<160, 3>::ZERO,
            },
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .with_from(account)
            .with_to(self.router)
            .with_input(Bytes::from(calldata));

        let receipt = self
            .submitter
            .submit_and_wait(tx)
            .await
            .map_err(as_route_error)?;

        let realized = amount_out_from_logs(&receipt, token_out, account);
        Ok(SwapReceipt {
            tx_hash: receipt.transaction_hash,
            amount_out: realized.unwrap_or(quoted.amountOut),
            gas_used: receipt.gas_used,
        })
    }
}

#[async_trait]
impl SwapExecutor for DirectSwapper {
    async fn swap(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        pool_hint: Option<PoolHint>,
    ) -> Result<Option<SwapReceipt>, BotError> {
        if amount_in.is_zero() {
            return Ok(None);
        }
        let fee = pool_hint.map(|h| h.fee).unwrap_or(3_000);

        match self.attempt(token_in, token_out, amount_in, fee).await {
            Ok(receipt) => Ok(Some(receipt)),
            Err(e) if e.is_retryable_swap() => {
                warn!(error = %e, "direct swap failed, retrying once with a fresh quote");
                self.attempt(token_in, token_out, amount_in, fee)
                    .await
                    .map(Some)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- min-out arithmetic -------------------------------------------------

    #[test]
    fn min_out_never_exceeds_amount() {
        let amounts = [
            U256::ZERO,
            U256::from(1u64),
            U256::from(999u64),
            U256::from(10_000u64),
            U256::from(u128::MAX),
        ];
        for &amount in &amounts {
            for bps in (0..=10_000).step_by(97).chain([0, 10_000]) {
                let min = amount_out_minimum(amount, bps);
                assert!(min <= amount, "bps={bps} amount={amount}");
            }
        }
    }

    #[test]
    fn min_out_exact_values() {
        // 3% of 1_000_000 → floor(1_000_000 · 9_700 / 10_000).
        assert_eq!(
            amount_out_minimum(U256::from(1_000_000u64), 300),
            U256::from(970_000u64)
        );
        assert_eq!(
            amount_out_minimum(U256::from(999u64), 10_000),
            U256::ZERO
        );
        assert_eq!(
            amount_out_minimum(U256::from(999u64), 0),
            U256::from(999u64)
        );
    }

    #[test]
    fn min_out_integer_division_floors() {
        // 1 bps of 10_001 = 10_001 · 9999 / 10_000 = 10_000 exactly (floored).
        assert_eq!(
            amount_out_minimum(U256::from(10_001u64), 1),
            U256::from(10_000u64)
        );
    }

    // -- router allowlist ---------------------------------------------------

    #[test]
    fn empty_allowlist_admits_all() {
        let router = Address::repeat_byte(0xab);
        assert!(router_allowed(&[], router));
    }

    #[test]
    fn allowlist_membership_is_exact_lowercase() {
        let router = "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5"
            .parse::<Address>()
            .unwrap();
        let allowlist = vec!["0x6131b5fae19ea4f9d964eac0408e4408b66337b5".to_string()];
        assert!(router_allowed(&allowlist, router));
        assert!(!router_allowed(&allowlist, Address::repeat_byte(0x01)));
    }

    // -- retry classification -----------------------------------------------

    #[test]
    fn submission_failures_become_route_errors() {
        let err = as_route_error(BotError::SimulationFailed {
            reason: "execution reverted: TransferFromFailed".into(),
        });
        assert!(err.is_retryable_swap());

        let err = as_route_error(BotError::NonceExpired);
        assert!(matches!(err, BotError::NonceExpired));
    }
}
