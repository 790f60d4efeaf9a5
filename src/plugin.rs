//! Plugins - named bundles of tools exposed to an agent as a unit.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::AgentDependencies;
use crate::handler::HandlerBinding;
use crate::tool::Tool;
use crate::Result;

/// Metadata identifying a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl PluginMetadata {
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: description.to_string(),
        }
    }
}

/// What a plugin sees of the agent during initialization.
#[derive(Clone)]
pub struct PluginContext {
    pub deps: Arc<AgentDependencies>,
    /// Names of every plugin registered on the agent, for dependency checks.
    pub peer_plugins: Vec<String>,
}

impl PluginContext {
    pub fn has_plugin(&self, name: &str) -> bool {
        self.peer_plugins.iter().any(|p| p == name)
    }
}

/// Plugin trait - anything implementing metadata, initialize, and tools.
///
/// `initialize` may be called again; implementations rebuild their tool set
/// from scratch each time, so repeated initialization never duplicates
/// tools or handler bindings.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Instantiate tools and bind each one to the handlers that serve it.
    async fn initialize(
        &mut self,
        ctx: PluginContext,
        handlers: &[HandlerBinding],
    ) -> Result<()>;

    /// Post-condition check: true once the agent context is attached.
    fn attached(&self) -> bool;

    /// Tools produced by the last successful initialization.
    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Filter a handler list down to the bindings serving one tool.
pub fn bindings_for(tool_name: &str, handlers: &[HandlerBinding]) -> Vec<HandlerBinding> {
    handlers
        .iter()
        .filter(|h| h.tool_name() == tool_name)
        .cloned()
        .collect()
}
