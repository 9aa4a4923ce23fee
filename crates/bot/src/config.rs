//! Runtime configuration for the position keeper.
//!
//! Loads from environment variables with sensible defaults. Every recognized
//! key is validated at startup; a malformed value fails fast with
//! `BotError::Config` rather than surfacing mid-cycle.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use rust_decimal::Decimal;

use crate::constants::{
    DEFAULT_AGGREGATOR_BASE_URL, DEFAULT_AGGREGATOR_CHAIN, DEFAULT_FEE_TIERS,
    DEFAULT_MIN_SWAP_VALUE_USDC, POSITION_MANAGER, QUOTER_V2, SWAP_ROUTER, TOKEN_USDC, TOKEN_WETH,
    UNISWAP_V3_FACTORY,
};
use crate::errors::BotError;

/// EIP-1559 by default; `legacy` for chains without type-2 support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasStrategy {
    Auto,
    Legacy,
}

impl FromStr for GasStrategy {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "legacy" => Ok(Self::Legacy),
            other => Err(BotError::Config(format!(
                "GAS_STRATEGY must be 'auto' or 'legacy', got '{other}'"
            ))),
        }
    }
}

/// Which swap execution path to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMode {
    Aggregator,
    Direct,
}

impl FromStr for SwapMode {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aggregator" => Ok(Self::Aggregator),
            "direct" => Ok(Self::Direct),
            other => Err(BotError::Config(format!(
                "SWAP_MODE must be 'aggregator' or 'direct', got '{other}'"
            ))),
        }
    }
}

/// Aggregator HTTP settings (KyberSwap-compatible API).
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub chain: String,
    /// Sent as `x-client-id` when set.
    pub client_id: Option<String>,
    /// `source` field in the build request.
    pub source: Option<String>,
    /// `includedSources` query param for the route request.
    pub included_sources: Option<String>,
    /// Lowercased router allowlist; empty means allow all.
    pub allowed_routers: Vec<String>,
}

/// Complete keeper configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hex-encoded signing key. Parsed into a signer in `main`.
    pub private_key: String,
    pub rpc_url: String,

    pub check_interval: Duration,
    pub slippage_bps: u32,
    pub min_swap_value_usdc: Decimal,
    /// Master switch for destructive actions (withdraw/swap/mint).
    pub auto_rebalance: bool,
    pub range_multiplier: f64,
    /// Minimum out-of-range drift (percent of range width) before acting.
    pub rebalance_threshold_pct: f64,

    pub gas_strategy: GasStrategy,
    pub max_gas_price_gwei: f64,
    pub priority_fee_gwei: f64,

    pub rpc_call_timeout: Duration,
    pub tx_wait_timeout: Duration,
    /// Post-confirmation settle pauses, per stage.
    pub settle_after_unstake: Duration,
    pub settle_after_withdraw: Duration,
    pub settle_after_swap: Duration,

    pub position_manager: Address,
    pub swap_router: Address,
    pub quoter: Address,
    /// Factories probed in order by the pool locator.
    pub factories: Vec<Address>,
    /// Fee tiers probed in order, per factory.
    pub fee_tiers: Vec<u32>,
    pub gauges: Vec<Address>,

    /// Pair used by the bootstrap path.
    pub token0: Address,
    pub token1: Address,
    /// Human-unit dust thresholds below which bootstrap does nothing.
    pub dust_token0: Decimal,
    pub dust_token1: Decimal,

    pub swap_mode: SwapMode,
    pub aggregator: AggregatorConfig,

    pub log_dir: String,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, BotError> {
        let private_key = env_string("PRIVATE_KEY")
            .ok_or_else(|| BotError::Config("PRIVATE_KEY is required".into()))?;

        let rpc_url =
            env_string("BASE_RPC_URL").unwrap_or_else(|| "https://mainnet.base.org".to_string());

        let check_interval_ms: u64 = env_require("CHECK_INTERVAL")?.unwrap_or(30_000);
        if check_interval_ms == 0 {
            return Err(BotError::Config("CHECK_INTERVAL must be positive".into()));
        }

        let slippage_bps: u32 = env_require("SLIPPAGE_BPS")?.unwrap_or(300);
        if slippage_bps > 10_000 {
            return Err(BotError::Config(format!(
                "SLIPPAGE_BPS must be <= 10000, got {slippage_bps}"
            )));
        }

        let min_swap_value_usdc: Decimal =
            env_require("MIN_SWAP_VALUE_USDC")?.unwrap_or(DEFAULT_MIN_SWAP_VALUE_USDC);

        let auto_rebalance = env_bool("AUTO_REBALANCE").unwrap_or(false);

        let range_multiplier: f64 = env_require("RANGE_MULTIPLIER")?.unwrap_or(2.6);
        if range_multiplier <= 0.0 {
            return Err(BotError::Config("RANGE_MULTIPLIER must be positive".into()));
        }

        let rebalance_threshold_pct: f64 = env_require("REBALANCE_THRESHOLD")?.unwrap_or(20.0);

        let gas_strategy: GasStrategy = match env_string("GAS_STRATEGY") {
            Some(v) => v.parse()?,
            None => GasStrategy::Auto,
        };
        let max_gas_price_gwei: f64 = env_require("MAX_GAS_PRICE")?.unwrap_or(0.05);
        let priority_fee_gwei: f64 = env_require("PRIORITY_FEE_GWEI")?.unwrap_or(0.001);

        let rpc_call_timeout =
            Duration::from_millis(env_require("RPC_CALL_TIMEOUT_MS")?.unwrap_or(30_000));
        let tx_wait_timeout =
            Duration::from_millis(env_require("TX_WAIT_TIMEOUT_MS")?.unwrap_or(180_000));

        let settle_after_unstake =
            Duration::from_millis(env_require("SETTLE_AFTER_UNSTAKE_MS")?.unwrap_or(2_000));
        let settle_after_withdraw =
            Duration::from_millis(env_require("SETTLE_AFTER_WITHDRAW_MS")?.unwrap_or(2_000));
        let settle_after_swap =
            Duration::from_millis(env_require("SETTLE_AFTER_SWAP_MS")?.unwrap_or(2_000));

        let position_manager = env_address("POSITION_MANAGER")?.unwrap_or(POSITION_MANAGER);
        let swap_router = env_address("SWAP_ROUTER")?.unwrap_or(SWAP_ROUTER);
        let quoter = env_address("QUOTER")?.unwrap_or(QUOTER_V2);

        let factories = match env_string("FACTORIES") {
            Some(v) => parse_address_list("FACTORIES", &v)?,
            None => vec![UNISWAP_V3_FACTORY],
        };
        if factories.is_empty() {
            return Err(BotError::Config("FACTORIES must not be empty".into()));
        }

        let fee_tiers: Vec<u32> = match env_string("FEE_TIERS") {
            Some(v) => parse_list("FEE_TIERS", &v)?,
            None => DEFAULT_FEE_TIERS.to_vec(),
        };
        if fee_tiers.is_empty() {
            return Err(BotError::Config("FEE_TIERS must not be empty".into()));
        }

        let gauges = match env_string("GAUGES") {
            Some(v) => parse_address_list("GAUGES", &v)?,
            None => Vec::new(),
        };

        let token0 = env_address("TOKEN0")?.unwrap_or(TOKEN_WETH);
        let token1 = env_address("TOKEN1")?.unwrap_or(TOKEN_USDC);
        if token0 == token1 {
            return Err(BotError::Config("TOKEN0 and TOKEN1 must differ".into()));
        }

        let dust_token0: Decimal = env_require("DUST_TOKEN0")?.unwrap_or(Decimal::ZERO);
        let dust_token1: Decimal = env_require("DUST_TOKEN1")?.unwrap_or(Decimal::ZERO);

        let swap_mode: SwapMode = match env_string("SWAP_MODE") {
            Some(v) => v.parse()?,
            None => SwapMode::Aggregator,
        };

        let aggregator = AggregatorConfig {
            base_url: env_string("API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AGGREGATOR_BASE_URL.to_string()),
            chain: env_string("CHAIN").unwrap_or_else(|| DEFAULT_AGGREGATOR_CHAIN.to_string()),
            client_id: env_string("CLIENT_ID"),
            source: env_string("SOURCE"),
            included_sources: env_string("INCLUDED_SOURCES"),
            allowed_routers: env_string("ALLOWED_ROUTERS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let log_dir = env_string("LOG_DIR").unwrap_or_else(|| "logs".to_string());

        Ok(Self {
            private_key,
            rpc_url,
            check_interval: Duration::from_millis(check_interval_ms),
            slippage_bps,
            min_swap_value_usdc,
            auto_rebalance,
            range_multiplier,
            rebalance_threshold_pct,
            gas_strategy,
            max_gas_price_gwei,
            priority_fee_gwei,
            rpc_call_timeout,
            tx_wait_timeout,
            settle_after_unstake,
            settle_after_withdraw,
            settle_after_swap,
            position_manager,
            swap_router,
            quoter,
            factories,
            fee_tiers,
            gauges,
            token0,
            token1,
            dust_token0,
            dust_token1,
            swap_mode,
            aggregator,
            log_dir,
        })
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Parse a set env var, failing loudly on a malformed value. Absent keys
/// fall back to the caller's default.
fn env_require<T: FromStr>(key: &str) -> Result<Option<T>, BotError> {
    match env_string(key) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| BotError::Config(format!("invalid value for {key}: '{v}'"))),
        None => Ok(None),
    }
}

fn env_address(key: &str) -> Result<Option<Address>, BotError> {
    match env_string(key) {
        Some(v) => v
            .parse::<Address>()
            .map(Some)
            .map_err(|_| BotError::Config(format!("invalid address for {key}: '{v}'"))),
        None => Ok(None),
    }
}

fn parse_address_list(key: &str, raw: &str) -> Result<Vec<Address>, BotError> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Address>()
                .map_err(|_| BotError::Config(format!("invalid address in {key}: '{s}'")))
        })
        .collect()
}

fn parse_list<T: FromStr>(key: &str, raw: &str) -> Result<Vec<T>, BotError> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| BotError::Config(format!("invalid value in {key}: '{s}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_KEYS: &[&str] = &[
        "PRIVATE_KEY",
        "BASE_RPC_URL",
        "CHECK_INTERVAL",
        "SLIPPAGE_BPS",
        "MIN_SWAP_VALUE_USDC",
        "AUTO_REBALANCE",
        "RANGE_MULTIPLIER",
        "REBALANCE_THRESHOLD",
        "GAS_STRATEGY",
        "MAX_GAS_PRICE",
        "PRIORITY_FEE_GWEI",
        "RPC_CALL_TIMEOUT_MS",
        "TX_WAIT_TIMEOUT_MS",
        "SETTLE_AFTER_UNSTAKE_MS",
        "SETTLE_AFTER_WITHDRAW_MS",
        "SETTLE_AFTER_SWAP_MS",
        "POSITION_MANAGER",
        "SWAP_ROUTER",
        "QUOTER",
        "FACTORIES",
        "FEE_TIERS",
        "GAUGES",
        "TOKEN0",
        "TOKEN1",
        "DUST_TOKEN0",
        "DUST_TOKEN1",
        "SWAP_MODE",
        "API_BASE_URL",
        "CHAIN",
        "CLIENT_ID",
        "SOURCE",
        "INCLUDED_SOURCES",
        "ALLOWED_ROUTERS",
        "LOG_DIR",
    ];

    fn clean_env() {
        for key in ALL_KEYS {
            std::env::remove_var(key);
        }
    }

    fn set_minimal() {
        std::env::set_var(
            "PRIVATE_KEY",
            "0x0123456789012345678901234567890123456789012345678901234567890123",
        );
    }

    #[test]
    #[serial]
    fn missing_private_key_fails() {
        clean_env();
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("PRIVATE_KEY"));
    }

    #[test]
    #[serial]
    fn defaults_applied() {
        clean_env();
        set_minimal();
        let config = Config::from_env().unwrap();
        assert_eq!(config.check_interval, Duration::from_millis(30_000));
        assert_eq!(config.slippage_bps, 300);
        assert!(!config.auto_rebalance);
        assert_eq!(config.gas_strategy, GasStrategy::Auto);
        assert_eq!(config.swap_mode, SwapMode::Aggregator);
        assert_eq!(config.fee_tiers, vec![100, 500, 3_000, 10_000]);
        assert_eq!(config.factories, vec![UNISWAP_V3_FACTORY]);
        assert!(config.gauges.is_empty());
        assert!(config.aggregator.allowed_routers.is_empty());
        clean_env();
    }

    #[test]
    #[serial]
    fn zero_interval_rejected() {
        clean_env();
        set_minimal();
        std::env::set_var("CHECK_INTERVAL", "0");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("CHECK_INTERVAL"));
        clean_env();
    }

    #[test]
    #[serial]
    fn malformed_address_rejected() {
        clean_env();
        set_minimal();
        std::env::set_var("POSITION_MANAGER", "not-an-address");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("POSITION_MANAGER"));
        clean_env();
    }

    #[test]
    #[serial]
    fn excess_slippage_rejected() {
        clean_env();
        set_minimal();
        std::env::set_var("SLIPPAGE_BPS", "10001");
        assert!(Config::from_env().is_err());
        clean_env();
    }

    #[test]
    #[serial]
    fn lists_and_routers_parsed() {
        clean_env();
        set_minimal();
        std::env::set_var("FEE_TIERS", "500, 3000");
        std::env::set_var(
            "ALLOWED_ROUTERS",
            "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5, 0xDEAD00000000000000000000000000000000BEEF",
        );
        let config = Config::from_env().unwrap();
        assert_eq!(config.fee_tiers, vec![500, 3_000]);
        assert_eq!(config.aggregator.allowed_routers.len(), 2);
        assert!(config.aggregator.allowed_routers[0].starts_with("0x6131b5fae1"));
        clean_env();
    }

    #[test]
    #[serial]
    fn gas_strategy_legacy() {
        clean_env();
        set_minimal();
        std::env::set_var("GAS_STRATEGY", "legacy");
        let config = Config::from_env().unwrap();
        assert_eq!(config.gas_strategy, GasStrategy::Legacy);

        std::env::set_var("GAS_STRATEGY", "eip4844");
        assert!(Config::from_env().is_err());
        clean_env();
    }

    #[test]
    #[serial]
    fn identical_bootstrap_pair_rejected() {
        clean_env();
        set_minimal();
        std::env::set_var("TOKEN0", "0x4200000000000000000000000000000000000006");
        std::env::set_var("TOKEN1", "0x4200000000000000000000000000000000000006");
        assert!(Config::from_env().is_err());
        clean_env();
    }
}
