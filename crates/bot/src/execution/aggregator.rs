//! Aggregator HTTP client: route quote and transaction build.
//!
//! Two-step flow against a KyberSwap-compatible API:
//!   1. `GET {base}/{chain}/api/v1/routes` → route summary + router address
//!   2. `POST {base}/{chain}/api/v1/route/build` → calldata for that summary
//!
//! A non-zero `code`, an HTML challenge body, or a router that changes
//! between route and build are all fatal for the attempt.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::AggregatorConfig;
use crate::errors::BotError;

/// Route summary returned by the quote endpoint, kept opaque for the build
/// request.
#[derive(Debug, Clone)]
pub struct RouteQuote {
    pub amount_out: U256,
    pub router: Address,
    pub route_summary: Value,
}

/// Encoded swap transaction from the build endpoint.
#[derive(Debug, Clone)]
pub struct BuiltSwap {
    pub router: Address,
    pub calldata: Vec<u8>,
    pub value: U256,
    pub amount_out: U256,
}

pub struct AggregatorClient {
    http: Client,
    config: AggregatorConfig,
}

impl AggregatorClient {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            config: config.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Fetch a swap route for `amount_in` of `token_in` into `token_out`.
    pub async fn get_route(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<RouteQuote, BotError> {
        let url = format!(
            "{}/{}/api/v1/routes",
            self.config.base_url, self.config.chain
        );

        let mut query: Vec<(&str, String)> = vec![
            ("tokenIn", format!("{token_in:#x}")),
            ("tokenOut", format!("{token_out:#x}")),
            ("amountIn", amount_in.to_string()),
        ];
        if let Some(sources) = &self.config.included_sources {
            query.push(("includedSources", sources.clone()));
        }

        let mut req = self.http.get(&url).query(&query);
        if let Some(client_id) = &self.config.client_id {
            req = req.header("x-client-id", client_id.as_str());
        }

        let body = req.send().await?.text().await?;
        let quote = parse_route_response(&body)?;
        debug!(
            router = %quote.router,
            amount_out = %quote.amount_out,
            "route received"
        );
        Ok(quote)
    }

    /// Build the swap transaction for a previously fetched route.
    ///
    /// Fails with [`BotError::UntrustedRouter`] if the build endpoint names a
    /// different router than the route did.
    pub async fn build_route(
        &self,
        quote: &RouteQuote,
        sender: Address,
        recipient: Address,
        slippage_bps: u32,
    ) -> Result<BuiltSwap, BotError> {
        let url = format!(
            "{}/{}/api/v1/route/build",
            self.config.base_url, self.config.chain
        );

        let mut body = serde_json::json!({
            "routeSummary": quote.route_summary,
            "sender": format!("{sender:#x}"),
            "recipient": format!("{recipient:#x}"),
            "slippageTolerance": slippage_bps,
        });
        if let Some(source) = &self.config.source {
            body["source"] = Value::String(source.clone());
        }

        let mut req = self.http.post(&url).json(&body);
        if let Some(client_id) = &self.config.client_id {
            req = req.header("x-client-id", client_id.as_str());
        }

        let text = req.send().await?.text().await?;
        let built = parse_build_response(&text)?;
        ensure_same_router(quote.router, built.router)?;
        Ok(built)
    }
}

// -----------------------------------------------------------------------
// Response parsing (pure, unit-tested)
// -----------------------------------------------------------------------

/// Bot-protection pages come back as HTML instead of JSON.
fn is_challenge_body(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('<') || body.to_lowercase().contains("challenge")
}

fn parse_route_response(body: &str) -> Result<RouteQuote, BotError> {
    if is_challenge_body(body) {
        return Err(BotError::Aggregator {
            reason: "route endpoint returned an HTML challenge page".into(),
        });
    }

    let json: Value = serde_json::from_str(body)?;
    let code = json["code"].as_i64().unwrap_or(-1);
    if code != 0 {
        return Err(BotError::Aggregator {
            reason: format!(
                "route endpoint returned code {code}: {}",
                json["message"].as_str().unwrap_or("?")
            ),
        });
    }

    let data = &json["data"];
    let route_summary = data["routeSummary"].clone();
    if route_summary.is_null() {
        return Err(BotError::Aggregator {
            reason: "route response missing routeSummary".into(),
        });
    }

    let router = parse_field_address(data, "routerAddress")?;
    let amount_out = parse_amount(&route_summary["amountOut"]).ok_or_else(|| {
        BotError::Aggregator {
            reason: "route summary missing amountOut".into(),
        }
    })?;

    Ok(RouteQuote {
        amount_out,
        router,
        route_summary,
    })
}

fn parse_build_response(body: &str) -> Result<BuiltSwap, BotError> {
    if is_challenge_body(body) {
        return Err(BotError::Aggregator {
            reason: "build endpoint returned an HTML challenge page".into(),
        });
    }

    let json: Value = serde_json::from_str(body)?;
    let code = json["code"].as_i64().unwrap_or(-1);
    if code != 0 {
        return Err(BotError::Aggregator {
            reason: format!(
                "build endpoint returned code {code}: {}",
                json["message"].as_str().unwrap_or("?")
            ),
        });
    }

    let data = &json["data"];
    let calldata_hex = data["data"]
        .as_str()
        .or_else(|| data["encodedSwapData"].as_str())
        .ok_or_else(|| BotError::Aggregator {
            reason: "build response missing calldata".into(),
        })?;
    let calldata = hex::decode(calldata_hex.strip_prefix("0x").unwrap_or(calldata_hex)).map_err(
        |_| BotError::Aggregator {
            reason: "build response calldata is not valid hex".into(),
        },
    )?;

    let router = parse_field_address(data, "routerAddress")?;
    let amount_out = parse_amount(&data["amountOut"]).unwrap_or(U256::ZERO);
    let value = parse_amount(&data["value"]).unwrap_or(U256::ZERO);

    Ok(BuiltSwap {
        router,
        calldata,
        value,
        amount_out,
    })
}

/// Route and build must agree on the router or the calldata cannot be
/// trusted.
fn ensure_same_router(route_router: Address, build_router: Address) -> Result<(), BotError> {
    if route_router != build_router {
        return Err(BotError::UntrustedRouter {
            router: format!("{build_router:#x} (route quoted {route_router:#x})"),
        });
    }
    Ok(())
}

fn parse_field_address(data: &Value, field: &str) -> Result<Address, BotError> {
    data[field]
        .as_str()
        .and_then(|s| s.parse::<Address>().ok())
        .ok_or_else(|| BotError::Aggregator {
            reason: format!("response missing or malformed {field}"),
        })
}

/// Amounts arrive as decimal strings, occasionally as raw numbers.
fn parse_amount(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER_A: &str = "0x6131B5fae19EA4f9D964eAc0408E4408b66337b5";
    const ROUTER_B: &str = "0x0000000000000000000000000000000000000bad";

    fn route_body(router: &str) -> String {
        format!(
            r#"{{"code":0,"message":"ok","data":{{"routeSummary":{{"amountOut":"123456789","tokenIn":"0x"}},"routerAddress":"{router}"}}}}"#
        )
    }

    #[test]
    fn route_response_parsed() {
        let quote = parse_route_response(&route_body(ROUTER_A)).unwrap();
        assert_eq!(quote.amount_out, U256::from(123_456_789_u64));
        assert_eq!(quote.router, ROUTER_A.parse::<Address>().unwrap());
        assert!(!quote.route_summary.is_null());
    }

    #[test]
    fn nonzero_code_rejected() {
        let body = r#"{"code":4008,"message":"route not found"}"#;
        let err = parse_route_response(body).unwrap_err();
        assert!(err.to_string().contains("4008"));
    }

    #[test]
    fn html_challenge_rejected() {
        let body = "<html><body>Checking your browser before accessing…</body></html>";
        assert!(parse_route_response(body).is_err());
        assert!(parse_build_response(body).is_err());
    }

    #[test]
    fn build_response_parsed_with_calldata_field() {
        let body = format!(
            r#"{{"code":0,"data":{{"data":"0xdeadbeef","routerAddress":"{ROUTER_A}","amountOut":"42","value":"0"}}}}"#
        );
        let built = parse_build_response(&body).unwrap();
        assert_eq!(built.calldata, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(built.amount_out, U256::from(42u64));
    }

    #[test]
    fn build_response_encoded_swap_data_fallback() {
        let body = format!(
            r#"{{"code":0,"data":{{"encodedSwapData":"0x0102","routerAddress":"{ROUTER_A}","amountOut":"1"}}}}"#
        );
        let built = parse_build_response(&body).unwrap();
        assert_eq!(built.calldata, vec![0x01, 0x02]);
    }

    #[test]
    fn router_mismatch_is_untrusted() {
        let route = ROUTER_A.parse::<Address>().unwrap();
        let build = ROUTER_B.parse::<Address>().unwrap();
        let err = ensure_same_router(route, build).unwrap_err();
        assert!(matches!(err, BotError::UntrustedRouter { .. }));
        assert!(ensure_same_router(route, route).is_ok());
    }

    #[test]
    fn missing_route_summary_rejected() {
        let body = format!(r#"{{"code":0,"data":{{"routerAddress":"{ROUTER_A}"}}}}"#);
        assert!(parse_route_response(&body).is_err());
    }
}
