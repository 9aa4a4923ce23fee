use std::sync::Arc;

use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::Http;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use range_keeper::config::{Config, SwapMode};
use range_keeper::core::monitor::Monitor;
use range_keeper::core::positions::PositionReader;
use range_keeper::core::rebalancer::Rebalancer;
use range_keeper::core::token_cache::ChainCache;
use range_keeper::execution::aggregator::AggregatorClient;
use range_keeper::execution::swapper::{AggregatorSwapper, DirectSwapper, SwapExecutor};
use range_keeper::execution::tx_submitter::{HttpProvider, TxSubmitter};
use range_keeper::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    // Load and validate configuration; any problem here is fatal.
    let config = Config::from_env().context("configuration")?;

    // Initialize tracing and hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.log_dir)?;

    log_configuration_summary(&config);

    // -----------------------------------------------------------------------
    // Signer and provider
    // -----------------------------------------------------------------------

    let key = config.private_key.clone();
    let key = key.strip_prefix("0x").unwrap_or(&key);
    let signer: PrivateKeySigner = key.parse().context("failed to parse PRIVATE_KEY")?;
    info!(address = %signer.address(), "signer initialized");

    let provider = build_provider(&config)?;
    let chain_id = provider
        .get_chain_id()
        .await
        .context("failed to query chain id")?;
    info!(chain_id, rpc = %config.rpc_url, "provider connected");

    // -----------------------------------------------------------------------
    // Component construction
    // -----------------------------------------------------------------------

    let cache = Arc::new(ChainCache::new(provider.clone()));

    let submitter = Arc::new(TxSubmitter::new(
        provider.clone(),
        signer,
        chain_id,
        &config,
    ));

    let swapper: Arc<dyn SwapExecutor> = match config.swap_mode {
        SwapMode::Aggregator => Arc::new(AggregatorSwapper::new(
            AggregatorClient::new(&config.aggregator),
            provider.clone(),
            submitter.clone(),
            config.aggregator.allowed_routers.clone(),
            config.slippage_bps,
        )),
        SwapMode::Direct => Arc::new(DirectSwapper::new(
            provider.clone(),
            submitter.clone(),
            config.quoter,
            config.swap_router,
            config.slippage_bps,
        )),
    };

    let rebalancer = Arc::new(Rebalancer::new(
        provider.clone(),
        submitter.clone(),
        swapper,
        cache.clone(),
        config.clone(),
    ));

    let reader = PositionReader::new(
        provider.clone(),
        cache.clone(),
        config.position_manager,
        config.gauges.clone(),
        config.factories.clone(),
        config.fee_tiers.clone(),
    );

    let shutdown = CancellationToken::new();
    let monitor = Monitor::new(
        provider,
        reader,
        rebalancer,
        submitter,
        cache,
        config,
        shutdown.clone(),
    );

    info!("all components initialized");

    // -----------------------------------------------------------------------
    // Run until interrupted
    // -----------------------------------------------------------------------

    let monitor_handle = tokio::spawn(async move {
        if let Err(e) = monitor.run().await {
            error!(error = %e, "monitor exited with error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();

    if let Err(e) = monitor_handle.await {
        error!(error = %e, "monitor task panicked");
    }

    info!("shutdown complete");
    Ok(())
}

/// HTTP provider whose underlying client enforces the configured per-call
/// timeout, so every chain read is bounded.
fn build_provider(config: &Config) -> Result<HttpProvider> {
    let url = config.rpc_url.parse().context("failed to parse RPC URL")?;
    let client = reqwest::Client::builder()
        .timeout(config.rpc_call_timeout)
        .build()
        .context("failed to build HTTP client")?;
    let transport = Http::with_client(client, url);
    Ok(RootProvider::new(RpcClient::new(transport, false)))
}

/// Structured summary of the effective configuration at boot.
fn log_configuration_summary(config: &Config) {
    info!("═══════════════════════════════════════════════════");
    info!("            RANGE KEEPER CONFIGURATION");
    info!("═══════════════════════════════════════════════════");
    info!(
        interval_ms = config.check_interval.as_millis() as u64,
        auto_rebalance = config.auto_rebalance,
        rebalance_threshold_pct = config.rebalance_threshold_pct,
        range_multiplier = config.range_multiplier,
        "Cycle settings"
    );
    info!(
        slippage_bps = config.slippage_bps,
        min_swap_value_usdc = %config.min_swap_value_usdc,
        swap_mode = ?config.swap_mode,
        "Swap settings"
    );
    info!(
        gas_strategy = ?config.gas_strategy,
        max_gas_price_gwei = config.max_gas_price_gwei,
        priority_fee_gwei = config.priority_fee_gwei,
        "Gas settings"
    );
    info!(
        position_manager = %config.position_manager,
        factories = config.factories.len(),
        fee_tiers = ?config.fee_tiers,
        gauges = config.gauges.len(),
        "Contracts"
    );
    info!(
        aggregator = %config.aggregator.base_url,
        chain = %config.aggregator.chain,
        allowed_routers = config.aggregator.allowed_routers.len(),
        "Aggregator"
    );
    info!("═══════════════════════════════════════════════════");
}
