use thiserror::Error;

/// Typed error hierarchy for the position keeper.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation. The rebalance state machine
/// pattern-matches on these kinds to choose between retry, advance, and fail.
#[derive(Error, Debug)]
pub enum BotError {
    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Transaction submission ---------------------------------------------
    #[error("transaction simulation failed: {reason}")]
    SimulationFailed { reason: String },

    #[error("transaction reverted: {reason} (tx: {tx_hash})")]
    TxReverted { tx_hash: String, reason: String },

    #[error("transaction timed out after {timeout_ms}ms (tx: {tx_hash})")]
    TxTimeout { tx_hash: String, timeout_ms: u64 },

    #[error("nonce expired: local counter stale against chain")]
    NonceExpired,

    #[error("RPC call timed out or dropped: {reason}")]
    RpcTransient { reason: String },

    // -- Swap ----------------------------------------------------------------
    #[error("aggregator returned untrusted router {router}")]
    UntrustedRouter { router: String },

    #[error("swap route reverted: {reason}")]
    RouteReverted { reason: String },

    #[error("aggregator error: {reason}")]
    Aggregator { reason: String },

    // -- Position lifecycle --------------------------------------------------
    #[error("mint reverted: {reason}")]
    MintReverted { reason: String },

    #[error("no pool found for pair {token0}/{token1}")]
    PoolNotFound { token0: String, token1: String },

    #[error("tick range collapsed: lower {lower} >= upper {upper}")]
    InvalidRange { lower: i32, upper: i32 },

    #[error("rebalance failed at {stage}: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: Box<BotError>,
    },

    // -- Lifecycle -----------------------------------------------------------
    #[error("shutdown requested")]
    Cancelled,

    // -- Forwarded errors ----------------------------------------------------
    #[error(transparent)]
    Alloy(#[from] alloy::transports::TransportError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Wrap an error with the state-machine stage it occurred in.
    pub fn at_stage(self, stage: &'static str) -> Self {
        BotError::StageFailed {
            stage,
            source: Box::new(self),
        }
    }

    /// Swap failures that warrant one retry with a fresh quote.
    pub fn is_retryable_swap(&self) -> bool {
        match self {
            BotError::RouteReverted { reason } => {
                reason.contains("CallFailed")
                    || reason.contains("InsufficientReturn")
                    || reason.contains("TransferFromFailed")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wrapping_keeps_source() {
        let err = BotError::MintReverted {
            reason: "STF".into(),
        }
        .at_stage("Minting");
        let msg = err.to_string();
        assert!(msg.contains("Minting"));
        assert!(msg.contains("mint reverted"));
    }

    #[test]
    fn retryable_swap_kinds() {
        let retry = BotError::RouteReverted {
            reason: "execution reverted: InsufficientReturn".into(),
        };
        assert!(retry.is_retryable_swap());

        let no_retry = BotError::UntrustedRouter {
            router: "0xdead".into(),
        };
        assert!(!no_retry.is_retryable_swap());

        let other = BotError::RouteReverted {
            reason: "SlippageCheck".into(),
        };
        assert!(!other.is_retryable_swap());
    }
}
