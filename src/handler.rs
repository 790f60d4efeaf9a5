//! Handlers - the smallest executable unit.
//!
//! A handler wraps one backend integration's ability to answer one request
//! shape for one tool, scoped to a set of networks, with an enable flag and
//! a priority. Services construct handlers; deployment configuration tunes
//! them once at initialization; after that they are shared read-only.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::network::NetworkName;
use crate::Result;

/// Response status on the handler wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Request passed to a handler: the target network plus tool-shaped params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerRequest {
    pub network: NetworkName,
    pub params: Value,
}

impl HandlerRequest {
    pub fn new(network: NetworkName, params: Value) -> Self {
        Self { network, params }
    }
}

/// Response returned by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HandlerResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            data: None,
        }
    }

    /// A handler succeeds iff the status is success AND it carries data.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success && self.data.is_some()
    }
}

/// Handler trait - one backend's implementation of a tool's contract.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique handler name, used to match deployment configuration.
    fn name(&self) -> &str;

    /// Name of the tool this handler serves.
    fn tool_name(&self) -> &str;

    /// Execute the request against the backend.
    async fn execute(&self, request: &HandlerRequest) -> Result<HandlerResponse>;
}

/// Deployment-time override for a named handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<NetworkName>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// A handler plus its deployment tuning, shared by reference.
///
/// Bindings are mutated only while their owning service initializes; every
/// copy handed to a tool afterwards is read-only by construction.
#[derive(Clone)]
pub struct HandlerBinding {
    handler: Arc<dyn Handler>,
    enabled: bool,
    priority: i32,
    networks: Vec<NetworkName>,
}

impl HandlerBinding {
    pub fn new(
        handler: Arc<dyn Handler>,
        priority: i32,
        enabled: bool,
        networks: Vec<NetworkName>,
    ) -> Self {
        Self {
            handler,
            enabled,
            priority,
            networks,
        }
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn tool_name(&self) -> &str {
        self.handler.tool_name()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn networks(&self) -> &[NetworkName] {
        &self.networks
    }

    pub fn supports_network(&self, network: NetworkName) -> bool {
        self.networks.contains(&network)
    }

    fn apply(&mut self, config: &HandlerConfig) {
        if let Some(enabled) = config.enabled {
            self.enabled = enabled;
        }
        if let Some(ref networks) = config.networks {
            self.networks = networks.clone();
        }
        if let Some(priority) = config.priority {
            self.priority = priority;
        }
    }
}

/// Ordered handler list owned by a service.
#[derive(Clone, Default)]
pub struct HandlerSet {
    bindings: Vec<HandlerBinding>,
}

impl HandlerSet {
    pub fn new(bindings: Vec<HandlerBinding>) -> Self {
        Self { bindings }
    }

    /// Apply deployment overrides, matched by handler name.
    ///
    /// Configs naming no registered handler are ignored.
    pub fn apply(&mut self, configs: &[HandlerConfig]) {
        for binding in &mut self.bindings {
            if let Some(config) = configs.iter().find(|c| c.name == binding.name()) {
                debug!(
                    "Applying config to handler {}: enabled={:?} priority={:?}",
                    binding.name(),
                    config.enabled,
                    config.priority
                );
                binding.apply(config);
            }
        }
    }

    pub fn bindings(&self) -> Vec<HandlerBinding> {
        self.bindings.clone()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Spy handler recording executions, for wiring and ordering tests.
    pub struct SpyHandler {
        pub handler_name: String,
        pub serves: String,
        pub response: Mutex<Option<HandlerResponse>>,
        pub calls: AtomicUsize,
        pub log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl SpyHandler {
        pub fn new(name: &str, serves: &str, response: HandlerResponse) -> Self {
            Self {
                handler_name: name.to_string(),
                serves: serves.to_string(),
                response: Mutex::new(Some(response)),
                calls: AtomicUsize::new(0),
                log: None,
            }
        }

        pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
            self.log = Some(log);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Handler for SpyHandler {
        fn name(&self) -> &str {
            &self.handler_name
        }

        fn tool_name(&self) -> &str {
            &self.serves
        }

        async fn execute(&self, _request: &HandlerRequest) -> Result<HandlerResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref log) = self.log {
                log.lock().unwrap().push(self.handler_name.clone());
            }
            let response = self.response.lock().unwrap().clone();
            response.ok_or_else(|| crate::Error::Handler("spy exhausted".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::SpyHandler;
    use super::*;
    use serde_json::json;

    fn binding(name: &str, priority: i32) -> HandlerBinding {
        HandlerBinding::new(
            Arc::new(SpyHandler::new(
                name,
                "get_swap_quote",
                HandlerResponse::success(json!({"ok": true})),
            )),
            priority,
            true,
            vec![NetworkName::Solana],
        )
    }

    #[test]
    fn test_apply_overrides_matched_by_name() {
        let mut set = HandlerSet::new(vec![binding("jupiter_quote", 1), binding("other", 5)]);
        set.apply(&[HandlerConfig {
            name: "jupiter_quote".to_string(),
            enabled: Some(false),
            networks: Some(vec![NetworkName::Ethereum]),
            priority: Some(9),
        }]);

        let bindings = set.bindings();
        let tuned = bindings.iter().find(|b| b.name() == "jupiter_quote").unwrap();
        assert!(!tuned.enabled());
        assert_eq!(tuned.priority(), 9);
        assert!(tuned.supports_network(NetworkName::Ethereum));
        assert!(!tuned.supports_network(NetworkName::Solana));

        let untouched = bindings.iter().find(|b| b.name() == "other").unwrap();
        assert!(untouched.enabled());
        assert_eq!(untouched.priority(), 5);
    }

    #[test]
    fn test_apply_ignores_unknown_names() {
        let mut set = HandlerSet::new(vec![binding("jupiter_quote", 1)]);
        set.apply(&[HandlerConfig {
            name: "nonexistent".to_string(),
            enabled: Some(false),
            ..Default::default()
        }]);
        assert!(set.bindings()[0].enabled());
    }

    #[test]
    fn test_response_success_requires_data() {
        let ok = HandlerResponse::success(json!({"x": 1}));
        assert!(ok.is_success());

        let err = HandlerResponse::error("boom");
        assert!(!err.is_success());

        // success status without data payload is not a success
        let empty = HandlerResponse {
            status: ResponseStatus::Success,
            message: None,
            data: None,
        };
        assert!(!empty.is_success());
    }

    #[test]
    fn test_handler_config_parses_partial() {
        let config: HandlerConfig =
            serde_json::from_str(r#"{"name":"jupiter_quote","priority":3}"#).unwrap();
        assert_eq!(config.name, "jupiter_quote");
        assert_eq!(config.priority, Some(3));
        assert!(config.enabled.is_none());
        assert!(config.networks.is_none());
    }
}
