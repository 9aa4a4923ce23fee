//! Process-wide metadata caches for ERC-20 tokens and CL pools.
//!
//! Both caches are strictly additive: token decimals/symbol and pool
//! structural fields are immutable once observed, so invalidation is never
//! required. Only `slot0` is re-read each cycle, and it never enters the
//! cache.

use std::collections::HashMap;

use alloy::primitives::Address;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::BotError;
use crate::execution::contracts::{ICLPool, IERC20};
use crate::execution::tx_submitter::HttpProvider;

/// Immutable ERC-20 attributes.
#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
}

/// Structural pool fields; `slot0` is deliberately absent.
#[derive(Debug, Clone, Copy)]
pub struct PoolMeta {
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    /// Informational only; some pool variants do not expose it.
    pub fee: Option<u32>,
}

/// Append-only metadata cache, owned by the orchestrator and borrowed by
/// callees.
pub struct ChainCache {
    provider: HttpProvider,
    tokens: RwLock<HashMap<Address, TokenMeta>>,
    pools: RwLock<HashMap<Address, PoolMeta>>,
}

impl ChainCache {
    pub fn new(provider: HttpProvider) -> Self {
        Self {
            provider,
            tokens: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Token metadata, fetching decimals and symbol concurrently on first
    /// sight.
    pub async fn token(&self, address: Address) -> Result<TokenMeta, BotError> {
        if let Some(meta) = self.tokens.read().await.get(&address) {
            return Ok(meta.clone());
        }

        let erc20 = IERC20::new(address, self.provider.clone());
        let (decimals, symbol) =
            futures::future::join(erc20.decimals().call(), erc20.symbol().call()).await;
        let meta = TokenMeta {
            decimals: decimals?,
            symbol: symbol?,
        };

        debug!(token = %address, symbol = %meta.symbol, decimals = meta.decimals, "token cached");
        self.tokens
            .write()
            .await
            .entry(address)
            .or_insert_with(|| meta.clone());
        Ok(meta)
    }

    /// Pool structural fields, read once per pool address.
    pub async fn pool(&self, address: Address) -> Result<PoolMeta, BotError> {
        if let Some(meta) = self.pools.read().await.get(&address) {
            return Ok(*meta);
        }

        let pool = ICLPool::new(address, self.provider.clone());
        let token0 = pool.token0().call().await?;
        let token1 = pool.token1().call().await?;
        let tick_spacing = i32::try_from(pool.tickSpacing().call().await?).unwrap_or(0);
        let fee = pool.fee().call().await.ok().map(|f| f.to::<u32>());

        let meta = PoolMeta {
            token0,
            token1,
            tick_spacing,
            fee,
        };

        debug!(pool = %address, tick_spacing, "pool cached");
        self.pools.write().await.entry(address).or_insert(meta);
        Ok(meta)
    }

    #[cfg(test)]
    pub async fn insert_pool(&self, address: Address, meta: PoolMeta) {
        self.pools.write().await.entry(address).or_insert(meta);
    }

    #[cfg(test)]
    pub async fn insert_token(&self, address: Address, meta: TokenMeta) {
        self.tokens.write().await.insert(address, meta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::RootProvider;

    fn offline_cache() -> ChainCache {
        // Nothing listens here: cached entries must be served without any
        // network round-trip.
        let provider = RootProvider::new_http("http://127.0.0.1:1".parse().unwrap());
        ChainCache::new(provider)
    }

    #[tokio::test]
    async fn cached_token_served_without_rpc() {
        let cache = offline_cache();
        let addr = Address::repeat_byte(0x11);
        cache
            .insert_token(
                addr,
                TokenMeta {
                    symbol: "USDC".into(),
                    decimals: 6,
                },
            )
            .await;

        let meta = cache.token(addr).await.expect("cache hit must not error");
        assert_eq!(meta.symbol, "USDC");
        assert_eq!(meta.decimals, 6);
    }

    #[tokio::test]
    async fn cached_pool_served_without_rpc() {
        let cache = offline_cache();
        let addr = Address::repeat_byte(0x22);
        let meta = PoolMeta {
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            tick_spacing: 60,
            fee: Some(3_000),
        };
        cache.insert_pool(addr, meta).await;

        let cached = cache.pool(addr).await.expect("cache hit must not error");
        assert_eq!(cached.tick_spacing, 60);
        assert_eq!(cached.fee, Some(3_000));
    }

    #[tokio::test]
    async fn uncached_lookup_fails_offline() {
        let cache = offline_cache();
        assert!(cache.token(Address::repeat_byte(0x33)).await.is_err());
    }
}
