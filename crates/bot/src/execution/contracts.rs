//! Compile-time ABI definitions for on-chain contracts via Alloy `sol!`.
//!
//! Reads go through the `#[sol(rpc)]` instances; writes are encoded locally
//! with `SolCall::abi_encode` and submitted through the `TxSubmitter`.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

// ---------------------------------------------------------------------------
// ERC-20
// ---------------------------------------------------------------------------

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

// ---------------------------------------------------------------------------
// Concentrated-liquidity pool + factory
// ---------------------------------------------------------------------------

sol! {
    /// Fast-changing pool state plus the structural fields the keeper caches.
    #[sol(rpc)]
    interface ICLPool {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );

        function token0() external view returns (address);
        function token1() external view returns (address);
        function tickSpacing() external view returns (int24);
        function fee() external view returns (uint24);
    }
}

sol! {
    #[sol(rpc)]
    interface ICLFactory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }
}

// ---------------------------------------------------------------------------
// Position manager (LP NFTs)
// ---------------------------------------------------------------------------

sol! {
    /// NonfungiblePositionManager: mints LP NFTs and mutates liquidity.
    #[sol(rpc)]
    interface IPositionManager {
        struct MintParams {
            address token0;
            address token1;
            int24 tickSpacing;
            int24 tickLower;
            int24 tickUpper;
            uint256 amount0Desired;
            uint256 amount1Desired;
            uint256 amount0Min;
            uint256 amount1Min;
            address recipient;
            uint256 deadline;
        }

        struct DecreaseLiquidityParams {
            uint256 tokenId;
            uint128 liquidity;
            uint256 amount0Min;
            uint256 amount1Min;
            uint256 deadline;
        }

        struct CollectParams {
            uint256 tokenId;
            address recipient;
            uint128 amount0Max;
            uint128 amount1Max;
        }

        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);

        function positions(uint256 tokenId) external view returns (
            uint96 nonce,
            address operator,
            address token0,
            address token1,
            int24 tickSpacing,
            int24 tickLower,
            int24 tickUpper,
            uint128 liquidity,
            uint256 feeGrowthInside0LastX128,
            uint256 feeGrowthInside1LastX128,
            uint128 tokensOwed0,
            uint128 tokensOwed1
        );

        function mint(MintParams calldata params) external payable returns (
            uint256 tokenId,
            uint128 liquidity,
            uint256 amount0,
            uint256 amount1
        );

        function decreaseLiquidity(DecreaseLiquidityParams calldata params) external payable returns (uint256 amount0, uint256 amount1);
        function collect(CollectParams calldata params) external payable returns (uint256 amount0, uint256 amount1);
        function burn(uint256 tokenId) external payable;
        function multicall(bytes[] calldata data) external payable returns (bytes[] memory results);

        function approve(address to, uint256 tokenId) external;
        function getApproved(uint256 tokenId) external view returns (address);

        event IncreaseLiquidity(uint256 indexed tokenId, uint128 liquidity, uint256 amount0, uint256 amount1);
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

// ---------------------------------------------------------------------------
// Reward gauge
// ---------------------------------------------------------------------------

sol! {
    /// Reward gauge custodying staked LP NFTs.
    #[sol(rpc)]
    interface IGauge {
        function pool() external view returns (address);
        function token0() external view returns (address);
        function token1() external view returns (address);

        function deposit(uint256 tokenId) external;
        function withdraw(uint256 tokenId) external;

        function stakedValues(address depositor) external view returns (uint256[] memory);
        function stakedLength(address depositor) external view returns (uint256);
        function stakedByIndex(address depositor, uint256 index) external view returns (uint256);

        function earned(address account, uint256 tokenId) external view returns (uint256);
    }
}

// ---------------------------------------------------------------------------
// Direct swap path
// ---------------------------------------------------------------------------

sol! {
    /// QuoterV2: gas-heavy simulation, always invoked via eth_call.
    #[sol(rpc)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (
            uint256 amountOut,
            uint160 sqrtPriceX96After,
            uint32 initializedTicksCrossed,
            uint256 gasEstimate
        );
    }
}

sol! {
    /// SwapRouter02: single-hop exact-input swaps.
    #[sol(rpc)]
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

// ---------------------------------------------------------------------------
// Permit2
// ---------------------------------------------------------------------------

sol! {
    /// Canonical Permit2 allowance ledger, used by aggregator routers.
    #[sol(rpc)]
    interface IPermit2 {
        function allowance(address owner, address token, address spender) external view returns (
            uint160 amount,
            uint48 expiration,
            uint48 nonce
        );

        function approve(address token, address spender, uint160 amount, uint48 expiration) external;
    }
}
