//! Network registry and RPC plumbing.
//!
//! Every handler declares the subset of [`NetworkName`]s it can serve, and
//! tools validate requested networks against the [`NetworkManager`] at
//! schema-construction time. The manager owns one JSON-RPC provider per
//! configured network.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::Result;

/// Networks the framework knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkName {
    Ethereum,
    Polygon,
    Solana,
}

impl NetworkName {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkName::Ethereum => "ethereum",
            NetworkName::Polygon => "polygon",
            NetworkName::Solana => "solana",
        }
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ethereum" => Ok(NetworkName::Ethereum),
            "polygon" => Ok(NetworkName::Polygon),
            "solana" => Ok(NetworkName::Solana),
            other => Err(Error::Network(format!("Unknown network: {other}"))),
        }
    }
}

/// Native currency metadata for an EVM network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmNetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    pub native_currency: NativeCurrency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaNetworkConfig {
    pub rpc_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_endpoint: Option<String>,
}

/// Per-network configuration, tagged by network family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkConfig {
    Evm(EvmNetworkConfig),
    Solana(SolanaNetworkConfig),
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> &str {
        match self {
            NetworkConfig::Evm(c) => &c.rpc_url,
            NetworkConfig::Solana(c) => &c.rpc_url,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, NetworkConfig::Evm(_))
    }
}

/// The full set of networks a deployment enables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworksConfig {
    pub default_network: NetworkName,
    pub networks: HashMap<NetworkName, NetworkConfig>,
}

/// Minimal JSON-RPC 2.0 client shared by EVM and Solana endpoints.
#[derive(Clone)]
pub struct RpcProvider {
    url: String,
    client: Client,
}

impl RpcProvider {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
        }
    }

    /// Issue a JSON-RPC call and return the `result` payload.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!("RPC call {} -> {}", method, self.url);
        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Network(format!(
                "RPC endpoint returned HTTP {status}"
            )));
        }

        let body: Value = response.json().await?;
        if let Some(err) = body.get("error") {
            return Err(Error::Network(format!("RPC error: {err}")));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| Error::Network("RPC response missing result".to_string()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Owns network configuration and one RPC provider per enabled network.
pub struct NetworkManager {
    config: NetworksConfig,
    providers: HashMap<NetworkName, Arc<RpcProvider>>,
}

impl NetworkManager {
    pub fn new(config: NetworksConfig) -> Self {
        let providers = config
            .networks
            .iter()
            .map(|(name, cfg)| (*name, Arc::new(RpcProvider::new(cfg.rpc_url()))))
            .collect();
        Self { config, providers }
    }

    pub fn is_supported(&self, network: NetworkName) -> bool {
        self.config.networks.contains_key(&network)
    }

    pub fn supported_networks(&self) -> Vec<NetworkName> {
        self.config.networks.keys().copied().collect()
    }

    pub fn default_network(&self) -> NetworkName {
        self.config.default_network
    }

    pub fn network_config(&self, network: NetworkName) -> Result<&NetworkConfig> {
        self.config
            .networks
            .get(&network)
            .ok_or_else(|| Error::Network(format!("Network {network} not found")))
    }

    pub fn provider(&self, network: NetworkName) -> Result<Arc<RpcProvider>> {
        self.providers
            .get(&network)
            .cloned()
            .ok_or_else(|| Error::Network(format!("No provider for network {network}")))
    }
}

#[cfg(test)]
pub(crate) fn test_networks() -> NetworksConfig {
    let mut networks = HashMap::new();
    networks.insert(
        NetworkName::Ethereum,
        NetworkConfig::Evm(EvmNetworkConfig {
            chain_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            explorer_url: None,
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }),
    );
    networks.insert(
        NetworkName::Solana,
        NetworkConfig::Solana(SolanaNetworkConfig {
            rpc_url: "http://localhost:8899".to_string(),
            explorer_url: None,
            ws_endpoint: None,
        }),
    );
    NetworksConfig {
        default_network: NetworkName::Solana,
        networks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_name_round_trip() {
        let name: NetworkName = "solana".parse().unwrap();
        assert_eq!(name, NetworkName::Solana);
        assert_eq!(name.to_string(), "solana");
        assert!("bitcoin".parse::<NetworkName>().is_err());
    }

    #[test]
    fn test_manager_supported_networks() {
        let manager = NetworkManager::new(test_networks());
        assert!(manager.is_supported(NetworkName::Ethereum));
        assert!(manager.is_supported(NetworkName::Solana));
        assert!(!manager.is_supported(NetworkName::Polygon));

        let mut names = manager.supported_networks();
        names.sort_by_key(|n| n.as_str());
        assert_eq!(names, vec![NetworkName::Ethereum, NetworkName::Solana]);
    }

    #[test]
    fn test_manager_unknown_network() {
        let manager = NetworkManager::new(test_networks());
        assert!(manager.provider(NetworkName::Polygon).is_err());
        assert!(manager.network_config(NetworkName::Polygon).is_err());
    }

    #[test]
    fn test_network_config_tagging() {
        let json = r#"{"type":"evm","chain_id":137,"rpc_url":"http://x",
            "native_currency":{"name":"Matic","symbol":"MATIC","decimals":18}}"#;
        let cfg: NetworkConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.is_evm());
        assert_eq!(cfg.rpc_url(), "http://x");
    }
}
