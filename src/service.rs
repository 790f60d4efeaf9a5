//! Services - named bundles of handlers sharing a backend client.
//!
//! A service is a registry/factory: it constructs its handlers up front,
//! applies deployment configuration to them during initialization, and then
//! hands them out as read-only bindings. The only request-scoped state a
//! service may hold is an internally locked, time-bounded cache.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::handler::{HandlerBinding, HandlerConfig};
use crate::Result;

/// Metadata identifying a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl ServiceMetadata {
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: description.to_string(),
        }
    }
}

/// Service trait - configure handlers as a unit, then expose them.
#[async_trait]
pub trait Service: Send + Sync {
    fn metadata(&self) -> &ServiceMetadata;

    /// Apply deployment overrides to this service's handlers.
    async fn initialize(&mut self, configs: &[HandlerConfig]) -> Result<()>;

    /// The service's handlers, as shareable bindings.
    fn handlers(&self) -> Vec<HandlerBinding>;
}
