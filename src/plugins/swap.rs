//! Swap plugin: quotes and execution with a human-review gate.
//!
//! Quotes come back flagged for review, so the graph suspends before any
//! swap is executed. Execution references a previously cached quote by id;
//! a stale or unknown quote makes each handler fall through until the chain
//! exhausts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::agent::AgentDependencies;
use crate::error::Error;
use crate::handler::{HandlerBinding, HandlerRequest};
use crate::network::NetworkName;
use crate::plugin::{bindings_for, Plugin, PluginContext, PluginMetadata};
use crate::tool::{HandlerChain, Tool, ToolExample, ToolOutput};
use crate::Result;

use super::check_network;

/// Default slippage percentage applied when a quote request omits it.
pub const DEFAULT_SLIPPAGE: f64 = 0.5;

pub struct SwapPlugin {
    metadata: PluginMetadata,
    ctx: Option<PluginContext>,
    tools: Vec<Arc<dyn Tool>>,
}

impl SwapPlugin {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new(
                "swap",
                "0.1.0",
                "Plugin for token swaps across multiple networks",
            ),
            ctx: None,
            tools: Vec::new(),
        }
    }
}

impl Default for SwapPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for SwapPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&mut self, ctx: PluginContext, handlers: &[HandlerBinding]) -> Result<()> {
        // swaps need an address to execute against
        if !ctx.has_plugin("wallet") {
            return Err(Error::plugin(
                self.metadata.name.as_str(),
                "requires the wallet plugin to be registered on the same agent",
            ));
        }

        let deps = ctx.deps.clone();
        self.tools = vec![
            Arc::new(GetSwapQuoteTool::new(
                deps.clone(),
                HandlerChain::new(bindings_for("get_swap_quote", handlers)),
            )),
            Arc::new(ExecuteSwapTool::new(
                deps,
                HandlerChain::new(bindings_for("execute_swap", handlers)),
            )),
        ];
        self.ctx = Some(ctx);
        Ok(())
    }

    fn attached(&self) -> bool {
        self.ctx.is_some()
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }
}

/// Quote a token swap. Output is flagged for human review and carries the
/// provider's `quoteId` for the follow-up `execute_swap` call.
pub struct GetSwapQuoteTool {
    deps: Arc<AgentDependencies>,
    chain: HandlerChain,
}

impl GetSwapQuoteTool {
    pub fn new(deps: Arc<AgentDependencies>, chain: HandlerChain) -> Self {
        Self { deps, chain }
    }
}

#[async_trait]
impl Tool for GetSwapQuoteTool {
    fn name(&self) -> &str {
        "get_swap_quote"
    }

    fn description(&self) -> &str {
        "Get a quote for swapping tokens on a specific network. Can specify either \
         input or output amount."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "fromToken": {
                    "type": "string",
                    "description": "The token to swap from (address or symbol)"
                },
                "toToken": {
                    "type": "string",
                    "description": "The token to swap to (address or symbol)"
                },
                "amount": {
                    "type": "string",
                    "description": "The amount to swap in human-readable format \
                                    (e.g., \"1.5\" ETH or \"100\" USDC)"
                },
                "amountType": {
                    "type": "string",
                    "enum": ["input", "output"],
                    "description": "Whether the amount is for input or output token"
                },
                "network": {
                    "type": "string",
                    "description": "The network to perform the swap on"
                },
                "slippage": {
                    "type": "number",
                    "description": "Optional slippage in percentage"
                }
            },
            "required": ["fromToken", "toToken", "amount", "amountType", "network"]
        })
    }

    fn examples(&self) -> Vec<ToolExample> {
        vec![ToolExample {
            user: "Get a quote to swap 0.1 SOL for USDC on Solana".to_string(),
            params: json!({
                "fromToken": "SOL",
                "toToken": "USDC",
                "amount": "0.1",
                "amountType": "input",
                "network": "solana",
                "slippage": 0.5
            }),
        }]
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        if input.get("fromToken").and_then(Value::as_str).is_none() {
            errors.push("fromToken is required".to_string());
        }
        if input.get("toToken").and_then(Value::as_str).is_none() {
            errors.push("toToken is required".to_string());
        }
        match input.get("amount").and_then(Value::as_str) {
            None => errors.push("amount is required".to_string()),
            Some(amount) => match amount.parse::<f64>() {
                Ok(value) if value > 0.0 => {}
                _ => errors.push("amount must be a positive number".to_string()),
            },
        }
        match input.get("amountType").and_then(Value::as_str) {
            Some("input") | Some("output") => {}
            _ => errors.push("amountType is required (must be \"input\" or \"output\")".to_string()),
        }
        match input.get("network").and_then(Value::as_str) {
            None => errors.push("network is required".to_string()),
            Some(network) => check_network(&self.deps.network, network, &mut errors),
        }
        if let Some(slippage) = input.get("slippage").and_then(Value::as_f64) {
            if slippage <= 0.0 || slippage > 100.0 {
                errors.push("slippage must be between 0 and 100".to_string());
            }
        }

        errors
    }

    async fn execute(&self, mut input: Value) -> ToolOutput {
        // validated upstream
        let Some(network) = input
            .get("network")
            .and_then(Value::as_str)
            .and_then(|n| n.parse::<NetworkName>().ok())
        else {
            return ToolOutput::error("network is required");
        };

        if input.get("slippage").is_none() {
            input["slippage"] = json!(DEFAULT_SLIPPAGE);
        }

        match self.chain.dispatch(&HandlerRequest::new(network, input)).await {
            Some(response) => {
                ToolOutput::success_for_review(response.data.unwrap_or(Value::Null))
            }
            None => ToolOutput::error("No handler was able to get a swap quote"),
        }
    }
}

/// Execute a previously quoted swap by `quoteId`.
pub struct ExecuteSwapTool {
    deps: Arc<AgentDependencies>,
    chain: HandlerChain,
}

impl ExecuteSwapTool {
    pub fn new(deps: Arc<AgentDependencies>, chain: HandlerChain) -> Self {
        Self { deps, chain }
    }
}

#[async_trait]
impl Tool for ExecuteSwapTool {
    fn name(&self) -> &str {
        "execute_swap"
    }

    fn description(&self) -> &str {
        "Execute a token swap using a previously obtained quote"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "quoteId": {
                    "type": "string",
                    "description": "The quote ID obtained from get_swap_quote"
                },
                "network": {
                    "type": "string",
                    "description": "The network to perform the swap on"
                }
            },
            "required": ["quoteId", "network"]
        })
    }

    fn examples(&self) -> Vec<ToolExample> {
        vec![ToolExample {
            user: "Execute the swap with quote ID abc123 on Solana".to_string(),
            params: json!({"quoteId": "abc123", "network": "solana"}),
        }]
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        if input.get("quoteId").and_then(Value::as_str).is_none() {
            errors.push("quoteId is required".to_string());
        }
        match input.get("network").and_then(Value::as_str) {
            None => errors.push("network is required".to_string()),
            Some(network) => check_network(&self.deps.network, network, &mut errors),
        }

        errors
    }

    async fn execute(&self, input: Value) -> ToolOutput {
        let Some(network) = input
            .get("network")
            .and_then(Value::as_str)
            .and_then(|n| n.parse::<NetworkName>().ok())
        else {
            return ToolOutput::error("network is required");
        };
        let quote_id = input
            .get("quoteId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let address = match self.deps.wallet.address(network).await {
            Ok(address) => address,
            Err(e) => return ToolOutput::error(e.to_string()),
        };

        info!("Executing swap for {address} on {network} with quote {quote_id}");
        let request = HandlerRequest::new(
            network,
            json!({"quoteId": quote_id, "walletAddress": address}),
        );

        match self.chain.dispatch(&request).await {
            Some(response) => ToolOutput::success(response.data.unwrap_or(Value::Null)),
            None => ToolOutput::error("No handler was able to execute the swap"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::SpyHandler;
    use crate::handler::{HandlerBinding, HandlerResponse};
    use crate::network::{test_networks, NetworkManager};
    use crate::tool::{invoke, ToolStatus};
    use crate::wallet::FixedWallet;

    fn deps() -> Arc<AgentDependencies> {
        Arc::new(AgentDependencies {
            wallet: Arc::new(FixedWallet::single(NetworkName::Solana, "So1anaAddr")),
            network: Arc::new(NetworkManager::new(test_networks())),
        })
    }

    fn binding(name: &str, serves: &str, response: HandlerResponse) -> HandlerBinding {
        HandlerBinding::new(
            Arc::new(SpyHandler::new(name, serves, response)),
            1,
            true,
            vec![NetworkName::Solana],
        )
    }

    fn quote_input() -> Value {
        json!({
            "fromToken": "SOL",
            "toToken": "USDC",
            "amount": "0.1",
            "amountType": "input",
            "network": "solana"
        })
    }

    #[tokio::test]
    async fn test_quote_success_is_flagged_for_review() {
        let chain = HandlerChain::new(vec![binding(
            "jupiter_quote",
            "get_swap_quote",
            HandlerResponse::success(json!({"quoteId": "q-123", "expiryTime": 1234567890})),
        )]);
        let tool = GetSwapQuoteTool::new(deps(), chain);

        let output = invoke(&tool, quote_input()).await;

        assert_eq!(output.status, ToolStatus::Success);
        assert!(output.requires_review);
        assert_eq!(output.data.unwrap()["quoteId"], "q-123");
    }

    #[tokio::test]
    async fn test_quote_validation_messages() {
        let tool = GetSwapQuoteTool::new(deps(), HandlerChain::default());

        let errors = tool.validate(&json!({"amount": "-1", "slippage": 150}));
        assert!(errors.contains(&"fromToken is required".to_string()));
        assert!(errors.contains(&"toToken is required".to_string()));
        assert!(errors.contains(&"amount must be a positive number".to_string()));
        assert!(errors
            .contains(&"amountType is required (must be \"input\" or \"output\")".to_string()));
        assert!(errors.contains(&"network is required".to_string()));
        assert!(errors.contains(&"slippage must be between 0 and 100".to_string()));
    }

    #[tokio::test]
    async fn test_quote_exhaustion_message() {
        let chain = HandlerChain::new(vec![binding(
            "jupiter_quote",
            "get_swap_quote",
            HandlerResponse::error("upstream down"),
        )]);
        let tool = GetSwapQuoteTool::new(deps(), chain);

        let output = invoke(&tool, quote_input()).await;
        assert_eq!(output.status, ToolStatus::Error);
        assert_eq!(
            output.message.as_deref(),
            Some("No handler was able to get a swap quote")
        );
    }

    #[tokio::test]
    async fn test_quote_applies_default_slippage() {
        struct CaptureHandler(std::sync::Mutex<Option<Value>>);

        #[async_trait]
        impl crate::handler::Handler for CaptureHandler {
            fn name(&self) -> &str {
                "capture"
            }
            fn tool_name(&self) -> &str {
                "get_swap_quote"
            }
            async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse> {
                *self.0.lock().unwrap() = Some(request.params.clone());
                Ok(HandlerResponse::success(json!({})))
            }
        }

        let handler = Arc::new(CaptureHandler(std::sync::Mutex::new(None)));
        let chain = HandlerChain::new(vec![HandlerBinding::new(
            handler.clone(),
            1,
            true,
            vec![NetworkName::Solana],
        )]);
        let tool = GetSwapQuoteTool::new(deps(), chain);
        invoke(&tool, quote_input()).await;

        let seen = handler.0.lock().unwrap().clone().unwrap();
        assert_eq!(seen["slippage"], DEFAULT_SLIPPAGE);
    }

    #[tokio::test]
    async fn test_execute_stale_quote_exhausts_chain() {
        // a handler that cannot validate the quote responds with an error,
        // which reads as fallthrough to the chain
        let chain = HandlerChain::new(vec![binding(
            "jupiter_execute",
            "execute_swap",
            HandlerResponse::error("quote expired"),
        )]);
        let tool = ExecuteSwapTool::new(deps(), chain);

        let output = invoke(&tool, json!({"quoteId": "stale", "network": "solana"})).await;
        assert_eq!(output.status, ToolStatus::Error);
        assert_eq!(
            output.message.as_deref(),
            Some("No handler was able to execute the swap")
        );
    }

    #[tokio::test]
    async fn test_execute_passes_wallet_address() {
        struct CaptureHandler(std::sync::Mutex<Option<Value>>);

        #[async_trait]
        impl crate::handler::Handler for CaptureHandler {
            fn name(&self) -> &str {
                "capture"
            }
            fn tool_name(&self) -> &str {
                "execute_swap"
            }
            async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse> {
                *self.0.lock().unwrap() = Some(request.params.clone());
                Ok(HandlerResponse::success(json!({"transactionHash": "tx1"})))
            }
        }

        let handler = Arc::new(CaptureHandler(std::sync::Mutex::new(None)));
        let chain = HandlerChain::new(vec![HandlerBinding::new(
            handler.clone(),
            1,
            true,
            vec![NetworkName::Solana],
        )]);
        let tool = ExecuteSwapTool::new(deps(), chain);

        let output = invoke(&tool, json!({"quoteId": "q-1", "network": "solana"})).await;
        assert!(output.is_success());

        let seen = handler.0.lock().unwrap().clone().unwrap();
        assert_eq!(seen["quoteId"], "q-1");
        assert_eq!(seen["walletAddress"], "So1anaAddr");
    }

    #[tokio::test]
    async fn test_plugin_requires_wallet_peer() {
        let mut plugin = SwapPlugin::new();

        let without_wallet = PluginContext {
            deps: deps(),
            peer_plugins: vec!["swap".to_string()],
        };
        let result = plugin.initialize(without_wallet, &[]).await;
        assert!(matches!(result, Err(Error::Plugin { .. })));
        assert!(!plugin.attached());

        let with_wallet = PluginContext {
            deps: deps(),
            peer_plugins: vec!["wallet".to_string(), "swap".to_string()],
        };
        plugin.initialize(with_wallet, &[]).await.unwrap();
        assert!(plugin.attached());
        assert_eq!(plugin.tools().len(), 2);
    }
}
