//! Pool discovery over configured (factory × fee-tier) tuples.

use alloy::primitives::Address;
use tracing::debug;

use crate::execution::contracts::ICLFactory;
use crate::execution::tx_submitter::HttpProvider;

/// Find a pool for a token pair by probing each configured factory with each
/// configured fee tier, in order. The first non-zero answer wins; the
/// configured ordering is authoritative.
///
/// Returns `None` when the whole (factory × feeTier) space is exhausted;
/// the caller treats such a position as unclassifiable for this cycle.
pub async fn find_pool(
    provider: &HttpProvider,
    factories: &[Address],
    fee_tiers: &[u32],
    token_a: Address,
    token_b: Address,
) -> Option<Address> {
    for &factory in factories {
        let contract = ICLFactory::new(factory, provider.clone());
        for &fee in fee_tiers {
            match contract
                .getPool(token_a, token_b, alloy::primitives::Uint::<24, 1>::from(fee))
                .call()
                .await
            {
                Ok(pool) if pool != Address::ZERO => {
                    debug!(%factory, fee, %pool, "pool located");
                    return Some(pool);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(%factory, fee, error = %e, "getPool probe failed, trying next");
                }
            }
        }
    }
    None
}
