//! Wallet capability interface.
//!
//! The core never touches key material; it calls these capabilities by name
//! and treats transaction payloads as opaque JSON. Concrete signers live
//! outside the framework.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::network::NetworkName;
use crate::Result;

/// Parameters for signing a free-form message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignMessageParams {
    pub message: String,
    pub network: NetworkName,
}

/// Parameters for signing a transaction payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignTransactionParams {
    pub transaction: Value,
    pub network: NetworkName,
}

/// Receipt returned after a transaction is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: String,
    pub status: String,
    pub submitted_at: DateTime<Utc>,
}

impl TransactionReceipt {
    pub fn pending(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: "pending".to_string(),
            submitted_at: Utc::now(),
        }
    }
}

/// Wallet trait — opaque signing and submission capability.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Address for the given network.
    async fn address(&self, network: NetworkName) -> Result<String>;

    /// Sign a free-form message, returning the signature.
    async fn sign_message(&self, params: SignMessageParams) -> Result<String>;

    /// Sign a transaction, returning the signed payload.
    async fn sign_transaction(&self, params: SignTransactionParams) -> Result<String>;

    /// Submit an already-signed transaction.
    async fn send_transaction(
        &self,
        network: NetworkName,
        transaction: Value,
    ) -> Result<TransactionReceipt>;

    /// Sign and submit in one step.
    async fn sign_and_send_transaction(
        &self,
        network: NetworkName,
        transaction: Value,
    ) -> Result<TransactionReceipt>;
}

/// Watch-only wallet holding fixed per-network addresses.
///
/// Useful for demos and read-only deployments; all signing capabilities
/// return [`Error::Wallet`].
pub struct FixedWallet {
    addresses: HashMap<NetworkName, String>,
}

impl FixedWallet {
    pub fn new(addresses: HashMap<NetworkName, String>) -> Self {
        Self { addresses }
    }

    pub fn single(network: NetworkName, address: impl Into<String>) -> Self {
        let mut addresses = HashMap::new();
        addresses.insert(network, address.into());
        Self { addresses }
    }
}

#[async_trait]
impl Wallet for FixedWallet {
    async fn address(&self, network: NetworkName) -> Result<String> {
        self.addresses
            .get(&network)
            .cloned()
            .ok_or_else(|| Error::Wallet(format!("No address configured for {network}")))
    }

    async fn sign_message(&self, _params: SignMessageParams) -> Result<String> {
        Err(Error::Wallet("Watch-only wallet cannot sign".to_string()))
    }

    async fn sign_transaction(&self, _params: SignTransactionParams) -> Result<String> {
        Err(Error::Wallet("Watch-only wallet cannot sign".to_string()))
    }

    async fn send_transaction(
        &self,
        _network: NetworkName,
        _transaction: Value,
    ) -> Result<TransactionReceipt> {
        Err(Error::Wallet("Watch-only wallet cannot send".to_string()))
    }

    async fn sign_and_send_transaction(
        &self,
        _network: NetworkName,
        _transaction: Value,
    ) -> Result<TransactionReceipt> {
        Err(Error::Wallet("Watch-only wallet cannot send".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_wallet_address() {
        let wallet = FixedWallet::single(NetworkName::Solana, "So1anaAddr");
        let addr = wallet.address(NetworkName::Solana).await.unwrap();
        assert_eq!(addr, "So1anaAddr");
        assert!(wallet.address(NetworkName::Ethereum).await.is_err());
    }

    #[tokio::test]
    async fn test_fixed_wallet_cannot_sign() {
        let wallet = FixedWallet::single(NetworkName::Solana, "So1anaAddr");
        let result = wallet
            .sign_message(SignMessageParams {
                message: "hello".to_string(),
                network: NetworkName::Solana,
            })
            .await;
        assert!(matches!(result, Err(Error::Wallet(_))));
    }
}
