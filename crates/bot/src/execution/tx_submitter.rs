//! Transaction submitter: signing, nonce ownership, fee policy, receipt waits.
//!
//! Owns the account key and the local nonce counter so that bursts of
//! sequential calls (approve → swap → mint → stake) do not race the RPC's
//! view of the chain. EIP-1559 type-2 transactions by default, with a legacy
//! gas-price path for chains that lack `baseFeePerGas`.
//!
//! On a nonce-expired send error the counter is re-derived from chain truth
//! and the send is retried exactly once; the retry is a recoverable anomaly,
//! not a stage advance.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Bytes, TxKind, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::transports::{RpcError, TransportError};
use std::future::IntoFuture;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, GasStrategy};
use crate::constants::{GAS_LIMIT_HEADROOM, WEI_PER_GWEI};
use crate::errors::BotError;

/// Concrete provider type: Alloy HTTP provider over the Ethereum network.
pub type HttpProvider = RootProvider;

/// `Error(string)` selector: `keccak256("Error(string)")[0..4]`.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `Panic(uint256)` selector: `keccak256("Panic(uint256)")[0..4]`.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

// ---------------------------------------------------------------------------
// Fee policy
// ---------------------------------------------------------------------------

/// Computed per-transaction fee fields, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    /// True when the cap forced the priority fee down.
    pub clamped: bool,
}

/// EIP-1559 fee computation: `maxFee = baseFee + priority`, capped at
/// `max_gas_price`. If the cap pushes `maxFee` below the priority fee the
/// priority fee is clamped to `maxFee` so the node never sees
/// `maxPriorityFee > maxFee`.
pub fn eip1559_fees(base_fee: u128, priority_fee: u128, max_gas_price: u128) -> FeeQuote {
    let uncapped = base_fee.saturating_add(priority_fee);
    let max_fee = uncapped.min(max_gas_price);
    if max_fee < priority_fee {
        FeeQuote {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: max_fee,
            clamped: true,
        }
    } else {
        FeeQuote {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee,
            clamped: false,
        }
    }
}

/// Convert a fractional gwei amount to wei.
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * WEI_PER_GWEI as f64) as u128
}

// ---------------------------------------------------------------------------
// Nonce counter
// ---------------------------------------------------------------------------

/// Local view of the account's next nonce. `None` until seeded from chain,
/// and again after a reset.
#[derive(Debug, Default)]
pub struct NonceCounter {
    next: Option<u64>,
}

impl NonceCounter {
    /// Take the next nonce, seeding from `chain_next` on first use.
    pub fn assign(&mut self, chain_next: u64) -> u64 {
        let nonce = self.next.unwrap_or(chain_next);
        self.next = Some(nonce + 1);
        nonce
    }

    /// Forget the local counter; the next assign re-derives from chain.
    pub fn reset(&mut self) {
        self.next = None;
    }

    pub fn is_seeded(&self) -> bool {
        self.next.is_some()
    }
}

/// Whether a send error indicates the local nonce view is stale.
fn is_nonce_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("nonce too low")
        || lower.contains("nonce expired")
        || lower.contains("nonce_expired")
        || lower.contains("invalid nonce")
}

// ---------------------------------------------------------------------------
// TxSubmitter
// ---------------------------------------------------------------------------

/// Nonce-managed signer and submission pipeline.
pub struct TxSubmitter {
    provider: HttpProvider,
    signer: PrivateKeySigner,
    chain_id: u64,
    nonce: Mutex<NonceCounter>,
    strategy: GasStrategy,
    max_gas_price: u128,
    priority_fee: u128,
    rpc_timeout: Duration,
    wait_timeout: Duration,
}

impl TxSubmitter {
    pub fn new(provider: HttpProvider, signer: PrivateKeySigner, chain_id: u64, config: &Config) -> Self {
        info!(
            address = %signer.address(),
            chain_id,
            strategy = ?config.gas_strategy,
            "tx submitter initialized"
        );

        Self {
            provider,
            signer,
            chain_id,
            nonce: Mutex::new(NonceCounter::default()),
            strategy: config.gas_strategy,
            max_gas_price: gwei_to_wei(config.max_gas_price_gwei),
            priority_fee: gwei_to_wei(config.priority_fee_gwei),
            rpc_timeout: config.rpc_call_timeout,
            wait_timeout: config.tx_wait_timeout,
        }
    }

    pub fn signer_address(&self) -> alloy::primitives::Address {
        self.signer.address()
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Simulate via `eth_call`, bounded by the RPC timeout.
    ///
    /// Returns raw output bytes on success; on revert, the Solidity reason
    /// decoded from the error's return data when the node supplies it.
    pub async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes, BotError> {
        let provider = &self.provider;
        let tx_clone = tx.clone();
        match tokio::time::timeout(
            self.rpc_timeout,
            async move { provider.call(tx_clone).await },
        )
        .await
        {
            Ok(Ok(result)) => {
                debug!(output_len = result.len(), "simulation succeeded");
                Ok(result)
            }
            Ok(Err(e)) => Err(BotError::SimulationFailed {
                reason: revert_reason_from_error(&e),
            }),
            Err(_) => Err(BotError::RpcTransient {
                reason: format!("eth_call timed out after {:?}", self.rpc_timeout),
            }),
        }
    }

    /// Full pipeline: submit, then poll for the confirmed receipt.
    pub async fn submit_and_wait(
        &self,
        tx: TransactionRequest,
    ) -> Result<TransactionReceipt, BotError> {
        let tx_hash = self.submit(tx).await?;
        self.wait_for_receipt(tx_hash).await
    }

    /// Sign and submit, retrying exactly once after a nonce reset.
    pub async fn submit(&self, tx: TransactionRequest) -> Result<B256, BotError> {
        match self.submit_once(tx.clone()).await {
            Err(BotError::NonceExpired) => {
                warn!("nonce expired, resetting from chain and retrying once");
                self.recover_nonce().await?;
                self.submit_once(tx).await
            }
            other => other,
        }
    }

    /// Poll for a receipt until confirmed or the wait timeout elapses.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, BotError> {
        let start = tokio::time::Instant::now();

        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.status() {
                        return Err(BotError::TxReverted {
                            tx_hash: tx_hash.to_string(),
                            reason: "reverted on-chain".into(),
                        });
                    }
                    info!(
                        tx_hash = %tx_hash,
                        gas_used = receipt.gas_used,
                        "transaction confirmed"
                    );
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, tx_hash = %tx_hash, "receipt poll error, retrying");
                }
            }

            if start.elapsed() >= self.wait_timeout {
                return Err(BotError::TxTimeout {
                    tx_hash: tx_hash.to_string(),
                    timeout_ms: self.wait_timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Drop the local nonce counter; the next send re-seeds from the chain's
    /// pending view.
    pub async fn recover_nonce(&self) -> Result<(), BotError> {
        let chain_nonce = self
            .rpc(self.provider.get_transaction_count(self.signer.address()).pending())
            .await?;
        self.nonce.lock().await.reset();
        warn!(chain_nonce, "nonce counter reset from chain");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn submit_once(&self, tx: TransactionRequest) -> Result<B256, BotError> {
        let nonce = self.next_nonce().await?;

        let gas_limit: u64 = match tx.gas {
            Some(gas) => gas,
            None => {
                let estimate = self
                    .rpc(self.provider.estimate_gas(tx.clone()))
                    .await
                    .map_err(|e| BotError::SimulationFailed {
                        reason: format!("gas estimation failed: {e}"),
                    })?;
                (estimate as f64 * GAS_LIMIT_HEADROOM) as u64
            }
        };

        let to = tx.to.unwrap_or(TxKind::Create);
        let value = tx.value.unwrap_or_default();
        let input = tx.input.into_input().unwrap_or_default();

        let raw = match self.strategy {
            GasStrategy::Auto => {
                let fees = self.eip1559_quote().await?;
                self.sign_eip1559(nonce, gas_limit, to, value, input, fees)?
            }
            GasStrategy::Legacy => {
                let gas_price = self.legacy_gas_price().await?;
                self.sign_legacy(nonce, gas_limit, to, value, input, gas_price)?
            }
        };

        let pending = match self.rpc(self.provider.send_raw_transaction(&raw)).await {
            Ok(p) => p,
            Err(e) => {
                let msg = e.to_string();
                if is_nonce_error(&msg) {
                    return Err(BotError::NonceExpired);
                }
                return Err(e);
            }
        };

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, nonce, gas_limit, "transaction submitted");
        Ok(tx_hash)
    }

    async fn next_nonce(&self) -> Result<u64, BotError> {
        let mut guard = self.nonce.lock().await;
        if guard.is_seeded() {
            // Chain value unused once seeded.
            return Ok(guard.assign(0));
        }
        let chain_nonce = self
            .rpc(self.provider.get_transaction_count(self.signer.address()).pending())
            .await?;
        debug!(nonce = chain_nonce, "nonce seeded from chain");
        Ok(guard.assign(chain_nonce))
    }

    /// Current fee fields from the latest block's base fee plus configured
    /// bounds. Logs when the cap clamps the priority fee.
    async fn eip1559_quote(&self) -> Result<FeeQuote, BotError> {
        let block = self
            .rpc(self.provider.get_block_by_number(BlockNumberOrTag::Latest))
            .await?
            .ok_or_else(|| BotError::RpcTransient {
                reason: "latest block unavailable".into(),
            })?;

        let base_fee = block.header.inner.base_fee_per_gas.unwrap_or(0) as u128;
        let fees = eip1559_fees(base_fee, self.priority_fee, self.max_gas_price);
        if fees.clamped {
            warn!(
                max_fee = fees.max_fee_per_gas,
                "MAX_GAS_PRICE below configured priority fee, priority fee clamped"
            );
        }
        Ok(fees)
    }

    async fn legacy_gas_price(&self) -> Result<u128, BotError> {
        let gas_price = self.rpc(self.provider.get_gas_price()).await?;
        Ok(gas_price.min(self.max_gas_price))
    }

    fn sign_eip1559(
        &self,
        nonce: u64,
        gas_limit: u64,
        to: TxKind,
        value: U256,
        input: Bytes,
        fees: FeeQuote,
    ) -> Result<Vec<u8>, BotError> {
        let tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to,
            value,
            access_list: Default::default(),
            input,
        };

        let sig_hash = tx.signature_hash();
        let sig = self
            .signer
            .sign_hash_sync(&sig_hash)
            .map_err(|e| BotError::SimulationFailed {
                reason: format!("transaction signing failed: {e}"),
            })?;

        let envelope = TxEnvelope::Eip1559(tx.into_signed(sig));
        Ok(envelope.encoded_2718())
    }

    fn sign_legacy(
        &self,
        nonce: u64,
        gas_limit: u64,
        to: TxKind,
        value: U256,
        input: Bytes,
        gas_price: u128,
    ) -> Result<Vec<u8>, BotError> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
        };

        let sig_hash = tx.signature_hash();
        let sig = self
            .signer
            .sign_hash_sync(&sig_hash)
            .map_err(|e| BotError::SimulationFailed {
                reason: format!("transaction signing failed: {e}"),
            })?;

        let envelope = TxEnvelope::Legacy(tx.into_signed(sig));
        Ok(envelope.encoded_2718())
    }

    /// Bound an RPC call by the configured timeout. Takes `IntoFuture` so
    /// alloy's call builders (`EthCall`, `RpcWithBlock`) pass through
    /// unawaited.
    async fn rpc<T, E, F>(&self, call: F) -> Result<T, BotError>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.rpc_timeout, call.into_future()).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(BotError::RpcTransient {
                reason: e.to_string(),
            }),
            Err(_) => Err(BotError::RpcTransient {
                reason: format!("RPC call timed out after {:?}", self.rpc_timeout),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Revert decoding
// ---------------------------------------------------------------------------

/// Revert reason for a failed `eth_call`: prefer the Solidity reason decoded
/// from the error response's return data, then the node's message, then the
/// transport error itself.
fn revert_reason_from_error(err: &TransportError) -> String {
    if let RpcError::ErrorResp(payload) = err {
        if let Some(reason) = payload
            .data
            .as_ref()
            .and_then(|data| decode_revert_data(data.get()))
        {
            return reason;
        }
        return payload.message.to_string();
    }
    err.to_string()
}

/// Decode the `"0x…"` JSON string of revert return data carried in an error
/// response's `data` field.
fn decode_revert_data(raw_json: &str) -> Option<String> {
    let hex_str = raw_json.trim().trim_matches('"').strip_prefix("0x")?;
    let bytes = hex::decode(hex_str).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(decode_revert_reason(&bytes))
}

/// Decode a Solidity revert reason from raw return data.
///
/// Handles `Error(string)` and `Panic(uint256)`; anything else is returned
/// hex-encoded.
pub fn decode_revert_reason(data: &[u8]) -> String {
    if data.len() < 4 {
        return if data.is_empty() {
            "unknown revert".into()
        } else {
            hex::encode(data)
        };
    }

    if data[..4] == ERROR_SELECTOR && data.len() >= 68 {
        let str_len = U256::from_be_slice(&data[36..68]).to::<usize>();
        if data.len() >= 68 + str_len {
            return String::from_utf8_lossy(&data[68..68 + str_len]).into_owned();
        }
    }

    if data[..4] == PANIC_SELECTOR && data.len() >= 36 {
        let code = U256::from_be_slice(&data[4..36]).to::<u64>();
        return match code {
            0x01 => "panic: assertion failed".into(),
            0x11 => "panic: arithmetic overflow/underflow".into(),
            0x12 => "panic: division by zero".into(),
            0x32 => "panic: array index out of bounds".into(),
            other => format!("panic(0x{other:x})"),
        };
    }

    hex::encode(data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- fee policy ---------------------------------------------------------

    #[test]
    fn priority_never_exceeds_max_fee() {
        // Sweep extreme base fees and caps; the node-level invariant
        // maxPriorityFee <= maxFee must hold on every output.
        let samples: [u128; 7] = [
            0,
            1,
            1_000_000_000,
            30_000_000_000,
            10_u128.pow(15),
            10_u128.pow(18),
            u128::MAX / 2,
        ];
        for &base in &samples {
            for &cap in &samples {
                for &prio in &samples {
                    let fees = eip1559_fees(base, prio, cap);
                    assert!(
                        fees.max_priority_fee_per_gas <= fees.max_fee_per_gas,
                        "violated for base={base} prio={prio} cap={cap}"
                    );
                    assert!(fees.max_fee_per_gas <= cap);
                }
            }
        }
    }

    #[test]
    fn cap_clamps_priority_fee() {
        // Cap below the priority fee: both fields collapse to the cap.
        let fees = eip1559_fees(5_000_000_000, 2_000_000_000, 1_000_000_000);
        assert_eq!(fees.max_fee_per_gas, 1_000_000_000);
        assert_eq!(fees.max_priority_fee_per_gas, 1_000_000_000);
        assert!(fees.clamped);
    }

    #[test]
    fn uncapped_sum_passes_through() {
        let fees = eip1559_fees(10_000_000, 1_000_000, u128::MAX);
        assert_eq!(fees.max_fee_per_gas, 11_000_000);
        assert_eq!(fees.max_priority_fee_per_gas, 1_000_000);
        assert!(!fees.clamped);
    }

    #[test]
    fn gwei_conversion() {
        assert_eq!(gwei_to_wei(1.0), 1_000_000_000);
        assert_eq!(gwei_to_wei(0.001), 1_000_000);
    }

    // -- nonce counter ------------------------------------------------------

    #[test]
    fn nonces_strictly_increase() {
        let mut counter = NonceCounter::default();
        let first = counter.assign(42);
        assert_eq!(first, 42);
        let mut prev = first;
        for _ in 0..10 {
            let n = counter.assign(0); // chain value ignored once seeded
            assert_eq!(n, prev + 1);
            prev = n;
        }
    }

    #[test]
    fn reset_rederives_from_chain() {
        let mut counter = NonceCounter::default();
        assert_eq!(counter.assign(7), 7);
        assert_eq!(counter.assign(0), 8);
        counter.reset();
        assert!(!counter.is_seeded());
        // Chain says the burst never landed.
        assert_eq!(counter.assign(7), 7);
        assert_eq!(counter.assign(0), 8);
    }

    // -- nonce error classification -----------------------------------------

    #[test]
    fn nonce_error_markers() {
        assert!(is_nonce_error("server returned: nonce too low"));
        assert!(is_nonce_error("NONCE_EXPIRED"));
        assert!(is_nonce_error("Invalid nonce for sender"));
        assert!(!is_nonce_error("insufficient funds for gas"));
    }

    // -- revert decoding ----------------------------------------------------

    fn error_string_payload(msg: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(68 + msg.len());
        data.extend_from_slice(&ERROR_SELECTOR);
        let mut offset = [0u8; 32];
        offset[31] = 0x20;
        data.extend_from_slice(&offset);
        let mut len = [0u8; 32];
        len[31] = msg.len() as u8;
        data.extend_from_slice(&len);
        data.extend_from_slice(msg);
        data
    }

    #[test]
    fn decodes_error_string() {
        let data = error_string_payload(b"STF");
        assert_eq!(decode_revert_reason(&data), "STF");
    }

    #[test]
    fn decodes_panic_code() {
        let mut data = vec![0u8; 36];
        data[..4].copy_from_slice(&PANIC_SELECTOR);
        data[35] = 0x11;
        assert_eq!(
            decode_revert_reason(&data),
            "panic: arithmetic overflow/underflow"
        );
    }

    #[test]
    fn unknown_payload_hex_encoded() {
        assert_eq!(decode_revert_reason(&[0xca, 0xfe]), "cafe");
        assert_eq!(decode_revert_reason(&[]), "unknown revert");
    }

    #[test]
    fn revert_data_extracted_from_error_response() {
        // eth_call errors carry the return data as a quoted hex JSON string.
        let raw = format!("\"0x{}\"", hex::encode(error_string_payload(b"STF")));
        assert_eq!(decode_revert_data(&raw).as_deref(), Some("STF"));
    }

    #[test]
    fn malformed_revert_data_ignored() {
        assert!(decode_revert_data("\"not hex\"").is_none());
        assert!(decode_revert_data("\"0x\"").is_none());
        assert!(decode_revert_data("null").is_none());
    }
}
