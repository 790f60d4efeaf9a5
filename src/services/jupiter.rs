//! Jupiter swap provider for Solana.
//!
//! The quote handler caches each provider quote under a generated id so the
//! execute handler can re-validate it after the human-review pause. Quotes
//! live 30 seconds; execution against a stale id reports the reason and
//! lets the handler chain fall through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::handler::{Handler, HandlerBinding, HandlerConfig, HandlerRequest, HandlerResponse, HandlerSet};
use crate::network::{NetworkName, RpcProvider};
use crate::service::{Service, ServiceMetadata};
use crate::Result;

const JUPITER_API_URL: &str = "https://quote-api.jup.ag/v6";

/// How long a cached quote stays valid.
pub const QUOTE_TTL: Duration = Duration::from_secs(30);

/// Relative output-amount drift beyond which a re-fetched quote no longer
/// matches the one the human approved.
pub const PRICE_DRIFT_THRESHOLD: f64 = 0.005;

/// Outcome of re-validating a cached quote before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStatus {
    Valid,
    NotFound,
    Expired,
    PriceChanged,
}

impl QuoteStatus {
    fn reason(&self) -> &'static str {
        match self {
            QuoteStatus::Valid => "valid",
            QuoteStatus::NotFound => "not_found",
            QuoteStatus::Expired => "expired",
            QuoteStatus::PriceChanged => "price_changed",
        }
    }
}

/// Result of a cache read, distinguishing expiry from absence.
pub enum QuoteLookup {
    Hit(Value),
    Expired,
    Missing,
}

struct CachedQuote {
    quote: Value,
    inserted_at: Instant,
}

/// Time-bounded quote store shared by the two Jupiter handlers.
///
/// Expired entries are dropped lazily on read and swept on every insert,
/// so the map never grows past the set of quotes touched in one TTL window.
#[derive(Default)]
pub struct QuoteCache {
    entries: Mutex<HashMap<String, CachedQuote>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, quote_id: &str, quote: Value) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, cached| cached.inserted_at.elapsed() <= QUOTE_TTL);
        entries.insert(
            quote_id.to_string(),
            CachedQuote {
                quote,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, quote_id: &str) -> QuoteLookup {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(quote_id) {
            None => return QuoteLookup::Missing,
            Some(cached) if cached.inserted_at.elapsed() <= QUOTE_TTL => {
                return QuoteLookup::Hit(cached.quote.clone());
            }
            Some(_) => {}
        }
        entries.remove(quote_id);
        QuoteLookup::Expired
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

/// Parameters for the quote endpoint.
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: String,
    pub slippage_bps: u32,
    pub swap_mode: &'static str,
}

impl QuoteRequest {
    /// Rebuild the request that produced a cached quote, for re-validation.
    fn from_cached(quote: &Value) -> Self {
        let exact_in = quote["swapMode"].as_str() != Some("ExactOut");
        let amount_key = if exact_in { "inAmount" } else { "outAmount" };
        Self {
            input_mint: string_field(quote, "inputMint"),
            output_mint: string_field(quote, "outputMint"),
            amount: string_field(quote, amount_key),
            slippage_bps: quote["slippageBps"].as_u64().unwrap_or(50) as u32,
            swap_mode: if exact_in { "ExactIn" } else { "ExactOut" },
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

/// Amount fields arrive as decimal strings; tolerate plain numbers too.
fn amount_as_f64(value: &Value, key: &str) -> f64 {
    match &value[key] {
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// True when the fresh quote's output drifted past the approval threshold.
fn price_drift_exceeds(cached: &Value, fresh: &Value) -> bool {
    let old = amount_as_f64(cached, "outAmount");
    let new = amount_as_f64(fresh, "outAmount");
    if old == 0.0 {
        return true;
    }
    ((new - old) / old).abs() > PRICE_DRIFT_THRESHOLD
}

/// Thin client for the Jupiter quote API.
pub struct JupiterApi {
    base_url: String,
    client: Client,
}

impl JupiterApi {
    pub fn new() -> Self {
        Self::with_base_url(JUPITER_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn quote(&self, request: &QuoteRequest) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", request.input_mint.as_str()),
                ("outputMint", request.output_mint.as_str()),
                ("amount", request.amount.as_str()),
                ("slippageBps", &request.slippage_bps.to_string()),
                ("swapMode", request.swap_mode),
            ])
            .send()
            .await?;

        let body: Value = response.json().await?;
        if let Some(err) = body.get("error") {
            return Err(Error::Handler(format!("Jupiter quote failed: {err}")));
        }
        Ok(body)
    }

    /// Request a serialized swap transaction for a quoted route.
    pub async fn swap_transaction(&self, quote: &Value, user_public_key: &str) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&json!({
                "quoteResponse": quote,
                "userPublicKey": user_public_key,
            }))
            .send()
            .await?;

        let body: Value = response.json().await?;
        if let Some(err) = body.get("error") {
            return Err(Error::Handler(format!("Jupiter swap failed: {err}")));
        }
        Ok(body)
    }
}

impl Default for JupiterApi {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `get_swap_quote` by quoting through Jupiter and caching the raw
/// quote under a fresh id.
pub struct JupiterQuoteHandler {
    api: Arc<JupiterApi>,
    cache: Arc<QuoteCache>,
}

impl JupiterQuoteHandler {
    pub fn new(api: Arc<JupiterApi>, cache: Arc<QuoteCache>) -> Self {
        Self { api, cache }
    }
}

#[async_trait]
impl Handler for JupiterQuoteHandler {
    fn name(&self) -> &str {
        "jupiter_quote"
    }

    fn tool_name(&self) -> &str {
        "get_swap_quote"
    }

    async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse> {
        let params = &request.params;
        let Some(from) = params.get("fromToken").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("fromToken is required"));
        };
        let Some(to) = params.get("toToken").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("toToken is required"));
        };
        let amount = params
            .get("amount")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let slippage_bps = params
            .get("slippage")
            .and_then(Value::as_f64)
            .map(|pct| (pct * 100.0).floor() as u32)
            .unwrap_or(50);
        let swap_mode = match params.get("amountType").and_then(Value::as_str) {
            Some("output") => "ExactOut",
            _ => "ExactIn",
        };

        let quote = self
            .api
            .quote(&QuoteRequest {
                input_mint: from.to_string(),
                output_mint: to.to_string(),
                amount: amount.to_string(),
                slippage_bps,
                swap_mode,
            })
            .await?;

        let quote_id = Uuid::new_v4().to_string();
        self.cache.insert(&quote_id, quote.clone());
        debug!("Cached Jupiter quote {quote_id}");

        let in_amount = amount_as_f64(&quote, "inAmount");
        let out_amount = amount_as_f64(&quote, "outAmount");
        let exchange_rate = if in_amount > 0.0 {
            out_amount / in_amount
        } else {
            0.0
        };

        Ok(HandlerResponse::success(json!({
            "fromToken": {"address": from, "amount": quote["inAmount"]},
            "toToken": {"address": to, "amount": quote["outAmount"]},
            "exchangeRate": exchange_rate.to_string(),
            "priceImpact": quote["priceImpactPct"],
            "provider": "jupiter",
            "quoteId": quote_id,
            "expiryTime": Utc::now().timestamp_millis() + QUOTE_TTL.as_millis() as i64,
        })))
    }
}

/// Serves `execute_swap`: re-validates the cached quote, fetches a swap
/// transaction, and submits it over Solana JSON-RPC.
pub struct JupiterExecuteHandler {
    api: Arc<JupiterApi>,
    cache: Arc<QuoteCache>,
    rpc: Arc<RpcProvider>,
}

impl JupiterExecuteHandler {
    pub fn new(api: Arc<JupiterApi>, cache: Arc<QuoteCache>, rpc: Arc<RpcProvider>) -> Self {
        Self { api, cache, rpc }
    }

    /// Check the quote is still present, unexpired, and close to the price
    /// the human approved.
    pub async fn validate_quote(&self, quote_id: &str) -> QuoteStatus {
        let quote = match self.cache.get(quote_id) {
            QuoteLookup::Missing => return QuoteStatus::NotFound,
            QuoteLookup::Expired => return QuoteStatus::Expired,
            QuoteLookup::Hit(quote) => quote,
        };

        match self.api.quote(&QuoteRequest::from_cached(&quote)).await {
            Ok(fresh) if price_drift_exceeds(&quote, &fresh) => QuoteStatus::PriceChanged,
            Ok(_) => QuoteStatus::Valid,
            Err(e) => {
                warn!("Quote re-fetch failed for {quote_id}: {e}");
                QuoteStatus::NotFound
            }
        }
    }
}

#[async_trait]
impl Handler for JupiterExecuteHandler {
    fn name(&self) -> &str {
        "jupiter_execute"
    }

    fn tool_name(&self) -> &str {
        "execute_swap"
    }

    async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse> {
        let params = &request.params;
        let Some(quote_id) = params.get("quoteId").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("quoteId is required"));
        };
        let Some(address) = params.get("walletAddress").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("walletAddress is required"));
        };

        let status = self.validate_quote(quote_id).await;
        if status != QuoteStatus::Valid {
            return Ok(HandlerResponse::error(format!(
                "Quote {quote_id} is not executable: {}",
                status.reason()
            )));
        }

        let QuoteLookup::Hit(quote) = self.cache.get(quote_id) else {
            return Ok(HandlerResponse::error(format!(
                "Quote {quote_id} is not executable: not_found"
            )));
        };

        let swap = self.api.swap_transaction(&quote, address).await?;
        let Some(transaction) = swap.get("swapTransaction").and_then(Value::as_str) else {
            return Ok(HandlerResponse::error("Swap response missing transaction"));
        };

        info!("Submitting Jupiter swap for quote {quote_id}");
        let signature = self
            .rpc
            .call("sendTransaction", json!([transaction, {"encoding": "base64"}]))
            .await?;

        Ok(HandlerResponse::success(json!({
            "transactionHash": signature,
            "status": "pending",
            "network": "solana",
            "fromToken": {"address": quote["inputMint"], "amount": quote["inAmount"]},
            "toToken": {"address": quote["outputMint"], "amount": quote["outAmount"]},
        })))
    }
}

pub struct JupiterServiceConfig {
    pub rpc_url: String,
}

/// Jupiter service: one quote handler and one execute handler, Solana only.
pub struct JupiterService {
    metadata: ServiceMetadata,
    handlers: HandlerSet,
}

impl JupiterService {
    pub fn new(config: JupiterServiceConfig) -> Self {
        let api = Arc::new(JupiterApi::new());
        let cache = Arc::new(QuoteCache::new());
        let rpc = Arc::new(RpcProvider::new(&config.rpc_url));

        let handlers = HandlerSet::new(vec![
            HandlerBinding::new(
                Arc::new(JupiterQuoteHandler::new(api.clone(), cache.clone())),
                1,
                true,
                vec![NetworkName::Solana],
            ),
            HandlerBinding::new(
                Arc::new(JupiterExecuteHandler::new(api, cache, rpc)),
                1,
                true,
                vec![NetworkName::Solana],
            ),
        ]);

        Self {
            metadata: ServiceMetadata::new("jupiter", "0.1.0", "Jupiter swap aggregator on Solana"),
            handlers,
        }
    }
}

#[async_trait]
impl Service for JupiterService {
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

    fn sample_quote(out_amount: &str) -> Value {
        json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "inAmount": "100000000",
            "outAmount": out_amount,
            "slippageBps": 50,
            "swapMode": "ExactIn",
            "priceImpactPct": 0.01
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_cache_ttl_boundary() {
        let cache = QuoteCache::new();
        cache.insert("q-1", sample_quote("20000000"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(matches!(cache.get("q-1"), QuoteLookup::Hit(_)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(cache.get("q-1"), QuoteLookup::Expired));
        // the expired read removed the entry
        assert!(matches!(cache.get("q-1"), QuoteLookup::Missing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_sweeps_expired_entries() {
        let cache = QuoteCache::new();
        cache.insert("old", sample_quote("1"));

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.insert("new", sample_quote("2"));

        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.get("new"), QuoteLookup::Hit(_)));
    }

    #[test]
    fn test_price_drift_threshold() {
        let cached = sample_quote("1000000");

        // 0.4% drift is tolerated
        assert!(!price_drift_exceeds(&cached, &sample_quote("1004000")));
        // 0.6% drift is not
        assert!(price_drift_exceeds(&cached, &sample_quote("1006000")));
        // drift in either direction counts
        assert!(price_drift_exceeds(&cached, &sample_quote("994000")));
    }

    #[test]
    fn test_quote_request_rebuilt_from_cache() {
        let request = QuoteRequest::from_cached(&sample_quote("5"));
        assert_eq!(request.input_mint, "So11111111111111111111111111111111111111112");
        assert_eq!(request.amount, "100000000");
        assert_eq!(request.swap_mode, "ExactIn");
        assert_eq!(request.slippage_bps, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_quote_without_network_access() {
        let handler = JupiterExecuteHandler::new(
            Arc::new(JupiterApi::new()),
            Arc::new(QuoteCache::new()),
            Arc::new(RpcProvider::new("http://localhost:8899")),
        );

        // unknown id resolves before any API call
        assert_eq!(handler.validate_quote("missing").await, QuoteStatus::NotFound);

        handler.cache.insert("q-1", sample_quote("1"));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(handler.validate_quote("q-1").await, QuoteStatus::Expired);
    }

    #[tokio::test]
    async fn test_service_applies_handler_config() {
        let mut service = JupiterService::new(JupiterServiceConfig {
            rpc_url: "http://localhost:8899".to_string(),
        });

        let bindings = service.handlers();
        let names: Vec<&str> = bindings.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["jupiter_quote", "jupiter_execute"]);

        service
            .initialize(&[HandlerConfig {
                name: "jupiter_execute".to_string(),
                enabled: Some(false),
                priority: Some(7),
                networks: None,
            }])
            .await
            .unwrap();

        let bindings = service.handlers();
        let execute = bindings.iter().find(|b| b.name() == "jupiter_execute").unwrap();
        assert!(!execute.enabled());
        assert_eq!(execute.priority(), 7);
        assert_eq!(execute.tool_name(), "execute_swap");
    }
}
