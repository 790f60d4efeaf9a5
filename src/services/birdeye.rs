//! Birdeye data provider: portfolio balances and token metadata.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::handler::{Handler, HandlerBinding, HandlerConfig, HandlerRequest, HandlerResponse, HandlerSet};
use crate::network::NetworkName;
use crate::service::{Service, ServiceMetadata};
use crate::Result;

const BIRDEYE_API_URL: &str = "https://public-api.birdeye.so";

/// Networks Birdeye can serve, in priority-neutral order.
pub const SUPPORTED_NETWORKS: [NetworkName; 3] = [
    NetworkName::Ethereum,
    NetworkName::Polygon,
    NetworkName::Solana,
];

/// Map a network to Birdeye's `x-chain` header value.
pub fn birdeye_chain(network: NetworkName) -> &'static str {
    match network {
        NetworkName::Ethereum => "ethereum",
        NetworkName::Polygon => "polygon",
        NetworkName::Solana => "solana",
    }
}

/// Thin client for the Birdeye public API.
pub struct BirdeyeApi {
    api_key: String,
    base_url: String,
    client: Client,
}

impl BirdeyeApi {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, BIRDEYE_API_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn get(&self, path: &str, chain: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", chain)
            .header("accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Handler(format!(
                "Birdeye returned HTTP {status} for {path}"
            )));
        }

        let body: Value = response.json().await?;
        if body.get("success") == Some(&Value::Bool(false)) {
            return Err(Error::Handler(format!("Birdeye request failed for {path}")));
        }
        Ok(body)
    }

    /// Token holdings for a wallet on one chain.
    pub async fn portfolio(&self, wallet: &str, chain: &str) -> Result<Value> {
        self.get("/v1/wallet/token_list", chain, &[("wallet", wallet)])
            .await
    }

    /// Metadata for a token address.
    pub async fn token_info(&self, address: &str, chain: &str) -> Result<Value> {
        self.get("/defi/token_overview", chain, &[("address", address)])
            .await
    }

    /// Keyword search across tokens.
    pub async fn search_token(&self, keyword: &str, chain: &str) -> Result<Value> {
        self.get("/defi/v3/search", chain, &[("keyword", keyword)])
            .await
    }
}

/// Shape one portfolio response into the balance entries the wallet plugin
/// reports per network.
fn map_portfolio(portfolio: &Value) -> Value {
    let items = portfolio["data"]["items"].as_array().cloned().unwrap_or_default();
    let tokens: Vec<Value> = items
        .iter()
        .map(|token| {
            json!({
                "name": token["name"],
                "symbol": token["symbol"],
                "address": token["address"],
                "decimals": token["decimals"],
                "amount": token["balance"],
                "uiAmount": token["uiAmount"],
                "usdValue": token["valueUsd"],
                "price": token["priceUsd"],
            })
        })
        .collect();
    json!(tokens)
}

/// Serves `get_balance` through Birdeye's portfolio endpoint.
pub struct BirdeyeBalanceHandler {
    api: Arc<BirdeyeApi>,
}

impl BirdeyeBalanceHandler {
    pub fn new(api: Arc<BirdeyeApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Handler for BirdeyeBalanceHandler {
    fn name(&self) -> &str {
        "birdeye_balance"
    }

    fn tool_name(&self) -> &str {
        "get_balance"
    }

    async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse> {
        let Some(address) = request.params.get("address").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("address is required"));
        };

        let chain = birdeye_chain(request.network);
        debug!("Fetching Birdeye portfolio for {address} on {chain}");
        let portfolio = self.api.portfolio(address, chain).await?;

        Ok(HandlerResponse::success(map_portfolio(&portfolio)))
    }
}

fn looks_like_address(query: &str) -> bool {
    query.starts_with("0x") || query.len() >= 32
}

/// Serves `get_token_info` by address lookup or symbol search.
pub struct BirdeyeTokenInfoHandler {
    api: Arc<BirdeyeApi>,
}

impl BirdeyeTokenInfoHandler {
    pub fn new(api: Arc<BirdeyeApi>) -> Self {
        Self { api }
    }

    fn exact_symbol_match(results: &Value, symbol: &str) -> Option<Value> {
        results["data"]["items"]
            .as_array()?
            .iter()
            .flat_map(|item| item["result"].as_array().cloned().unwrap_or_default())
            .find(|token| {
                token["symbol"]
                    .as_str()
                    .is_some_and(|s| s.eq_ignore_ascii_case(symbol))
            })
    }
}

#[async_trait]
impl Handler for BirdeyeTokenInfoHandler {
    fn name(&self) -> &str {
        "birdeye_token_info"
    }

    fn tool_name(&self) -> &str {
        "get_token_info"
    }

    async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse> {
        let Some(query) = request.params.get("query").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("query is required"));
        };
        let chain = birdeye_chain(request.network);

        if looks_like_address(query) {
            let info = self.api.token_info(query, chain).await?;
            let data = &info["data"];
            return Ok(HandlerResponse::success(json!({
                "address": data["address"],
                "name": data["name"],
                "symbol": data["symbol"],
                "decimals": data["decimals"],
                "totalSupply": data["supply"],
                "network": chain,
            })));
        }

        let results = self.api.search_token(query, chain).await?;
        match Self::exact_symbol_match(&results, query) {
            Some(token) => Ok(HandlerResponse::success(json!({
                "address": token["address"],
                "name": token["name"],
                "symbol": token["symbol"],
                "decimals": token["decimals"],
                "network": chain,
            }))),
            None => Ok(HandlerResponse::error(format!(
                "No token found with symbol {query}"
            ))),
        }
    }
}

pub struct BirdeyeServiceConfig {
    pub api_key: String,
}

/// Birdeye service: balance and token-info handlers across all chains the
/// provider supports.
pub struct BirdeyeService {
    metadata: ServiceMetadata,
    handlers: HandlerSet,
}

impl BirdeyeService {
    pub fn new(config: BirdeyeServiceConfig) -> Self {
        let api = Arc::new(BirdeyeApi::new(&config.api_key));
        let networks = SUPPORTED_NETWORKS.to_vec();

        let handlers = HandlerSet::new(vec![
            HandlerBinding::new(
                Arc::new(BirdeyeBalanceHandler::new(api.clone())),
                1,
                true,
                networks.clone(),
            ),
            HandlerBinding::new(
                Arc::new(BirdeyeTokenInfoHandler::new(api)),
                1,
                true,
                networks,
            ),
        ]);

        Self {
            metadata: ServiceMetadata::new(
                "birdeye",
                "0.1.0",
                "Birdeye market data across EVM and Solana networks",
            ),
            handlers,
        }
    }
}

#[async_trait]
impl Service for BirdeyeService {
    fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    async fn initialize(&mut self, configs: &[HandlerConfig]) -> Result<()> {
        self.handlers.apply(configs);
        Ok(())
    }

    fn handlers(&self) -> Vec<HandlerBinding> {
        self.handlers.bindings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_mapping() {
        assert_eq!(birdeye_chain(NetworkName::Solana), "solana");
        assert_eq!(birdeye_chain(NetworkName::Ethereum), "ethereum");
        assert_eq!(birdeye_chain(NetworkName::Polygon), "polygon");
    }

    #[test]
    fn test_map_portfolio_shapes_tokens() {
        let portfolio = json!({
            "data": {
                "items": [{
                    "name": "Solana",
                    "symbol": "SOL",
                    "address": "So11111111111111111111111111111111111111112",
                    "decimals": 9,
                    "balance": "1500000000",
                    "uiAmount": 1.5,
                    "valueUsd": 210.0,
                    "priceUsd": 140.0,
                    "logoURI": "https://example.com/sol.png"
                }],
                "totalUsd": 210.0
            }
        });

        let tokens = map_portfolio(&portfolio);
        assert_eq!(tokens[0]["symbol"], "SOL");
        assert_eq!(tokens[0]["uiAmount"], 1.5);
        assert_eq!(tokens[0]["usdValue"], 210.0);
        // provider-specific fields are not forwarded
        assert!(tokens[0].get("logoURI").is_none());
    }

    #[test]
    fn test_exact_symbol_match_is_case_insensitive() {
        let results = json!({
            "data": {
                "items": [{
                    "result": [
                        {"symbol": "USDCet", "address": "a1"},
                        {"symbol": "USDC", "address": "a2", "name": "USD Coin", "decimals": 6}
                    ]
                }]
            }
        });

        let token = BirdeyeTokenInfoHandler::exact_symbol_match(&results, "usdc").unwrap();
        assert_eq!(token["address"], "a2");

        assert!(BirdeyeTokenInfoHandler::exact_symbol_match(&results, "WETH").is_none());
    }

    #[test]
    fn test_address_detection() {
        assert!(looks_like_address("0x1234567890123456789012345678901234567890"));
        assert!(looks_like_address("So11111111111111111111111111111111111111112"));
        assert!(!looks_like_address("USDC"));
    }

    #[tokio::test]
    async fn test_service_handlers_and_config() {
        let mut service = BirdeyeService::new(BirdeyeServiceConfig {
            api_key: "test-key".to_string(),
        });

        let bindings = service.handlers();
        assert_eq!(bindings.len(), 2);
        assert!(bindings[0].supports_network(NetworkName::Polygon));

        service
            .initialize(&[HandlerConfig {
                name: "birdeye_balance".to_string(),
                networks: Some(vec![NetworkName::Solana]),
                enabled: None,
                priority: Some(5),
            }])
            .await
            .unwrap();

        let bindings = service.handlers();
        let balance = bindings.iter().find(|b| b.name() == "birdeye_balance").unwrap();
        assert_eq!(balance.priority(), 5);
        assert!(!balance.supports_network(NetworkName::Ethereum));
        assert!(balance.supports_network(NetworkName::Solana));
    }
}
