//! Token plugin: metadata lookups for tokens by address or symbol.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::AgentDependencies;
use crate::handler::{HandlerBinding, HandlerRequest};
use crate::plugin::{bindings_for, Plugin, PluginContext, PluginMetadata};
use crate::tool::{HandlerChain, Tool, ToolExample, ToolOutput};
use crate::Result;

use super::check_network;

pub struct TokenPlugin {
    metadata: PluginMetadata,
    ctx: Option<PluginContext>,
    tools: Vec<Arc<dyn Tool>>,
}

impl TokenPlugin {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new(
                "token",
                "0.1.0",
                "Plugin for querying token metadata across networks",
            ),
            ctx: None,
            tools: Vec::new(),
        }
    }
}

impl Default for TokenPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for TokenPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&mut self, ctx: PluginContext, handlers: &[HandlerBinding]) -> Result<()> {
        self.tools = vec![Arc::new(GetTokenInfoTool::new(
            ctx.deps.clone(),
            HandlerChain::new(bindings_for("get_token_info", handlers)),
        ))];
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

fn is_evm_address(query: &str) -> bool {
    query.len() == 42
        && query.starts_with("0x")
        && query[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_base58_address(query: &str) -> bool {
    (32..=44).contains(&query.len())
        && query.chars().all(|c| {
            c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
        })
}

/// Look up metadata for one or more tokens by address or symbol.
///
/// Each query resolves independently through the handler chain; a query no
/// handler can answer yields a per-query error entry rather than failing
/// the whole batch.
pub struct GetTokenInfoTool {
    deps: Arc<AgentDependencies>,
    chain: HandlerChain,
}

impl GetTokenInfoTool {
    pub fn new(deps: Arc<AgentDependencies>, chain: HandlerChain) -> Self {
        Self { deps, chain }
    }

    async fn resolve(&self, query: &str, network_field: Option<&str>) -> Value {
        // an absent network falls back to the deployment default so the
        // chain can still match handlers by network
        let network = network_field
            .and_then(|n| n.parse().ok())
            .unwrap_or_else(|| self.deps.network.default_network());

        let mut params = json!({"query": query});
        if let Some(name) = network_field {
            params["network"] = json!(name);
        }

        debug!("Resolving token info for {query} on {network}");
        match self.chain.dispatch(&HandlerRequest::new(network, params)).await {
            Some(response) => json!({
                "status": "success",
                "data": response.data,
            }),
            None => json!({
                "status": "error",
                "message": format!("No handler was able to fetch token information for {query}"),
            }),
        }
    }
}

#[async_trait]
impl Tool for GetTokenInfoTool {
    fn name(&self) -> &str {
        "get_token_info"
    }

    fn description(&self) -> &str {
        "Get detailed information about multiple tokens by their addresses or symbols"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tokens": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The token address or symbol to search for"
                            },
                            "network": {
                                "type": "string",
                                "description": "The specific network to search on"
                            }
                        },
                        "required": ["query"]
                    }
                }
            },
            "required": ["tokens"]
        })
    }

    fn examples(&self) -> Vec<ToolExample> {
        vec![
            ToolExample {
                user: "Get info about USDC and USDT tokens".to_string(),
                params: json!({"tokens": [{"query": "USDC"}, {"query": "USDT"}]}),
            },
            ToolExample {
                user: "What is the token at address 0x1234 on ethereum?".to_string(),
                params: json!({"tokens": [
                    {"query": "0x1234567890123456789012345678901234567890", "network": "ethereum"}
                ]}),
            },
        ]
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let Some(tokens) = input.get("tokens").and_then(Value::as_array) else {
            return vec!["Input must contain a non-empty array of token queries".to_string()];
        };
        if tokens.is_empty() {
            return vec!["Input must contain a non-empty array of token queries".to_string()];
        }

        for token in tokens {
            let query = token.get("query").and_then(Value::as_str).unwrap_or_default();
            if query.is_empty() {
                errors.push("Each token entry requires a query".to_string());
                continue;
            }

            if let Some(network) = token.get("network").and_then(Value::as_str) {
                check_network(&self.deps.network, network, &mut errors);
            }

            if query.starts_with("0x") {
                if !is_evm_address(query) {
                    errors.push(format!("Invalid Ethereum address format for query {query}"));
                }
            } else if (32..=44).contains(&query.len()) {
                if !is_base58_address(query) {
                    errors.push(format!("Invalid Solana address format for query {query}"));
                }
            } else if query.len() > 20 {
                errors.push(format!("Token symbol is too long for query {query}"));
            }
        }

        errors
    }

    async fn execute(&self, input: Value) -> ToolOutput {
        let tokens = input
            .get("tokens")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let query = token.get("query").and_then(Value::as_str).unwrap_or_default();
            let network = token.get("network").and_then(Value::as_str);
            results.push(self.resolve(query, network).await);
        }

        ToolOutput::success(json!({"results": results}))
    }
}
