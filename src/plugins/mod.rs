//! Built-in capability plugins.

pub mod swap;
pub mod token;
pub mod wallet;

pub use swap::SwapPlugin;
pub use token::TokenPlugin;
pub use wallet::WalletPlugin;

use crate::network::{NetworkManager, NetworkName};

/// Sorted, comma-joined network names for validation messages.
pub(crate) fn network_list(manager: &NetworkManager) -> String {
    let mut names: Vec<&str> = manager
        .supported_networks()
        .iter()
        .map(NetworkName::as_str)
        .collect();
    names.sort_unstable();
    names.join(", ")
}

/// Parse and check a `network` field against the deployment's networks.
pub(crate) fn check_network(manager: &NetworkManager, value: &str, errors: &mut Vec<String>) {
    match value.parse::<NetworkName>() {
        Ok(network) if manager.is_supported(network) => {}
        _ => errors.push(format!(
            "Network '{}' is not supported. Available networks: {}",
            value,
            network_list(manager)
        )),
    }
}
