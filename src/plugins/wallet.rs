//! Wallet plugin: addresses and balances.
//!
//! Balance lookups fan out per network and tolerate partial failure, since
//! balances on different networks are independent. A network with no
//! serving handler falls back to a native RPC balance query.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::AgentDependencies;
use crate::handler::{HandlerBinding, HandlerRequest};
use crate::network::NetworkName;
use crate::plugin::{bindings_for, Plugin, PluginContext, PluginMetadata};
use crate::tool::{HandlerChain, Tool, ToolExample, ToolOutput};
use crate::Result;

use super::{check_network, network_list};

pub struct WalletPlugin {
    metadata: PluginMetadata,
    ctx: Option<PluginContext>,
    tools: Vec<Arc<dyn Tool>>,
}

impl WalletPlugin {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new(
                "wallet",
                "0.1.0",
                "Plugin for managing wallet addresses and balances",
            ),
            ctx: None,
            tools: Vec::new(),
        }
    }
}

impl Default for WalletPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for WalletPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&mut self, ctx: PluginContext, handlers: &[HandlerBinding]) -> Result<()> {
        let deps = ctx.deps.clone();
        self.tools = vec![
            Arc::new(GetWalletAddressTool::new(deps.clone())),
            Arc::new(GetBalanceTool::new(
                deps,
                HandlerChain::new(bindings_for("get_balance", handlers)),
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

/// Returns the wallet address for one or every configured network.
pub struct GetWalletAddressTool {
    deps: Arc<AgentDependencies>,
}

impl GetWalletAddressTool {
    pub fn new(deps: Arc<AgentDependencies>) -> Self {
        Self { deps }
    }

    fn networks_to_query(&self, input: &Value) -> Vec<NetworkName> {
        match input.get("network").and_then(Value::as_str) {
            Some(name) => name.parse().map(|n| vec![n]).unwrap_or_default(),
            None => {
                let mut networks = self.deps.network.supported_networks();
                networks.sort_unstable_by_key(NetworkName::as_str);
                networks
            }
        }
    }
}

#[async_trait]
impl Tool for GetWalletAddressTool {
    fn name(&self) -> &str {
        "get_wallet_address"
    }

    fn description(&self) -> &str {
        "Get the wallet address for one or all networks. If network is not specified, \
         returns addresses for all supported networks."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "network": {
                    "type": "string",
                    "description": "The network to get the address for. If not provided, \
                                    returns addresses for all networks."
                }
            }
        })
    }

    fn examples(&self) -> Vec<ToolExample> {
        vec![
            ToolExample {
                user: "What is my solana address?".to_string(),
                params: json!({"network": "solana"}),
            },
            ToolExample {
                user: "What are all my wallet addresses?".to_string(),
                params: json!({}),
            },
        ]
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(network) = input.get("network").and_then(Value::as_str) {
            check_network(&self.deps.network, network, &mut errors);
        }
        errors
    }

    async fn execute(&self, input: Value) -> ToolOutput {
        let networks = self.networks_to_query(&input);

        let results = join_all(networks.iter().map(|&network| async move {
            (network, self.deps.wallet.address(network).await)
        }))
        .await;

        let mut addresses = serde_json::Map::new();
        let mut errors = Vec::new();
        for (network, result) in results {
            match result {
                Ok(address) => {
                    addresses.insert(network.to_string(), Value::String(address));
                }
                Err(e) => errors.push(format!("{network}: {e}")),
            }
        }

        if addresses.is_empty() {
            return ToolOutput::validation_failure(errors);
        }

        let mut output = ToolOutput::success(Value::Object(addresses));
        if !errors.is_empty() {
            output.errors = Some(errors);
        }
        output
    }
}

/// Returns wallet balances, fanning out per network.
pub struct GetBalanceTool {
    deps: Arc<AgentDependencies>,
    chain: HandlerChain,
}

impl GetBalanceTool {
    pub fn new(deps: Arc<AgentDependencies>, chain: HandlerChain) -> Self {
        Self { deps, chain }
    }

    /// Balance for one network: handler chain first, then the network's own
    /// RPC endpoint when no handler serves it.
    async fn balance_for(&self, network: NetworkName) -> Result<Value> {
        let address = self.deps.wallet.address(network).await?;

        let request = HandlerRequest::new(network, json!({"address": address}));
        if let Some(response) = self.chain.dispatch(&request).await {
            // dispatch only returns successes carrying data
            let mut entry = json!({"network": network.to_string()});
            if let Some(data) = response.data {
                entry["tokens"] = data;
            }
            return Ok(entry);
        }

        debug!("No balance handler for {network}; querying RPC directly");
        let native = self.native_balance(network, &address).await?;
        Ok(json!({"network": network.to_string(), "native": native}))
    }

    async fn native_balance(&self, network: NetworkName, address: &str) -> Result<Value> {
        let provider = self.deps.network.provider(network)?;
        let config = self.deps.network.network_config(network)?;

        if config.is_evm() {
            let result = provider
                .call("eth_getBalance", json!([address, "latest"]))
                .await?;
            let hex = result.as_str().unwrap_or("0x0");
            let wei = u128::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or(0);
            Ok(json!({
                "amount": wei.to_string(),
                "uiAmount": (wei as f64 / 1e18).to_string(),
            }))
        } else {
            let result = provider.call("getBalance", json!([address])).await?;
            let lamports = result
                .get("value")
                .and_then(Value::as_u64)
                .or_else(|| result.as_u64())
                .unwrap_or(0);
            Ok(json!({
                "amount": lamports.to_string(),
                "uiAmount": (lamports as f64 / 1e9).to_string(),
            }))
        }
    }
}

#[async_trait]
impl Tool for GetBalanceTool {
    fn name(&self) -> &str {
        "get_balance"
    }

    fn description(&self) -> &str {
        "Get the wallet balance for one or all networks. If network is not specified, \
         returns balances for all supported networks."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "network": {
                    "type": "string",
                    "description": "The network to get the balance for. If not provided, \
                                    returns balances for all networks."
                }
            }
        })
    }

    fn examples(&self) -> Vec<ToolExample> {
        vec![
            ToolExample {
                user: "What is my solana balance?".to_string(),
                params: json!({"network": "solana"}),
            },
            ToolExample {
                user: "What are all my wallet balances?".to_string(),
                params: json!({}),
            },
        ]
    }

    fn validate(&self, input: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(network) = input.get("network").and_then(Value::as_str) {
            check_network(&self.deps.network, network, &mut errors);
        }
        errors
    }

    async fn execute(&self, input: Value) -> ToolOutput {
        let networks: Vec<NetworkName> = match input.get("network").and_then(Value::as_str) {
            Some(name) => name.parse().map(|n| vec![n]).unwrap_or_default(),
            None => {
                let mut networks = self.deps.network.supported_networks();
                networks.sort_unstable_by_key(NetworkName::as_str);
                networks
            }
        };

        let results = join_all(
            networks
                .iter()
                .map(|&network| async move { (network, self.balance_for(network).await) }),
        )
        .await;

        // balances are independent per network, so one failure does not
        // discard the others
        let mut balances = Vec::new();
        let mut errors = Vec::new();
        for (network, result) in results {
            match result {
                Ok(entry) => balances.push(entry),
                Err(e) => {
                    warn!("Balance lookup failed for {network}: {e}");
                    errors.push(format!("{network}: {e}"));
                }
            }
        }

        if balances.is_empty() {
            return ToolOutput {
                errors: (!errors.is_empty()).then_some(errors),
                ..ToolOutput::error(format!(
                    "Could not fetch balances for any network ({})",
                    network_list(&self.deps.network)
                ))
            };
        }

        let mut output = ToolOutput::success(json!({"balances": balances}));
        if !errors.is_empty() {
            output.errors = Some(errors);
        }
        output
    }
}
