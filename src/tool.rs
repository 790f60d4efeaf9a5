//! Tools - the unit the model can invoke.
//!
//! A tool declares a name, description, input schema, and usage examples;
//! validates input; and resolves requests through a priority-ordered chain
//! of handlers. Provider failover inside the chain is invisible to the
//! model: it only ever sees one tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::handler::{HandlerBinding, HandlerRequest, HandlerResponse};

/// Tool definition handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A usage example rendered into the tool description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExample {
    pub user: String,
    pub params: Value,
}

/// Outcome status of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Structured tool output - the wire contract the model and UIs depend on.
///
/// `requires_review` is a typed field rather than a probe into opaque JSON;
/// it serializes as `needHumanConfirmation` for consumers of the raw stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(
        rename = "needHumanConfirmation",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub requires_review: bool,
}

impl ToolOutput {
    pub fn success(data: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            message: None,
            errors: None,
            data: Some(data),
            requires_review: false,
        }
    }

    /// Success that must pass human review before the agent proceeds.
    pub fn success_for_review(data: Value) -> Self {
        Self {
            requires_review: true,
            ..Self::success(data)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: Some(message.into()),
            errors: None,
            data: None,
            requires_review: false,
        }
    }

    pub fn validation_failure(errors: Vec<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: None,
            errors: Some(errors),
            data: None,
            requires_review: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Tool trait - anything implementing name, schema, validate, and execute.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Globally unique name, used for model invocation and config lookups.
    fn name(&self) -> &str;

    /// What the tool does, shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool input.
    fn schema(&self) -> Value;

    /// Usage examples appended to the description.
    fn examples(&self) -> Vec<ToolExample> {
        Vec::new()
    }

    /// Validate input, returning a list of problems (empty means valid).
    fn validate(&self, input: &Value) -> Vec<String>;

    /// Execute with validated input.
    async fn execute(&self, input: Value) -> ToolOutput;

    /// Convert to the definition handed to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: describe_with_examples(self.description(), &self.examples(), self.name()),
            parameters: self.schema(),
        }
    }
}

/// Render a tool description with its examples as a short conversation.
fn describe_with_examples(description: &str, examples: &[ToolExample], name: &str) -> String {
    if examples.is_empty() {
        return description.to_string();
    }

    let rendered: Vec<String> = examples
        .iter()
        .enumerate()
        .map(|(i, example)| {
            let params =
                serde_json::to_string_pretty(&example.params).unwrap_or_else(|_| "{}".to_string());
            format!(
                "Example {}:\nHuman: {}\nAssistant: Use the {} tool with the following parameters: {}",
                i + 1,
                example.user,
                name,
                params
            )
        })
        .collect();

    format!("{}\n\n{}", description, rendered.join("\n\n"))
}

/// Validate-then-execute driver used by the execution graph.
///
/// Invalid input short-circuits with a structured validation failure; no
/// handler runs and no side effects occur.
pub async fn invoke(tool: &dyn Tool, input: Value) -> ToolOutput {
    info!("Executing tool: {}", tool.name());
    debug!("Tool {} input: {}", tool.name(), input);

    let errors = tool.validate(&input);
    if !errors.is_empty() {
        warn!("Tool {} validation failed: {}", tool.name(), errors.join(", "));
        return ToolOutput::validation_failure(errors);
    }

    tool.execute(input).await
}

/// Priority-ordered handler chain with fallthrough on failure.
///
/// Sorted stably descending by priority at bind time, so equal priorities
/// keep their registration order.
#[derive(Clone, Default)]
pub struct HandlerChain {
    bindings: Vec<HandlerBinding>,
}

impl HandlerChain {
    pub fn new(mut bindings: Vec<HandlerBinding>) -> Self {
        bindings.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { bindings }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Try each handler in order; return the first success.
    ///
    /// Disabled handlers and handlers not supporting the requested network
    /// are skipped. A handler error (returned or thrown) logs and falls
    /// through to the next handler; the same handler is never retried.
    pub async fn dispatch(&self, request: &HandlerRequest) -> Option<HandlerResponse> {
        for binding in &self.bindings {
            if !binding.enabled() {
                debug!("Skipping disabled handler {}", binding.name());
                continue;
            }
            if !binding.supports_network(request.network) {
                debug!(
                    "Handler {} does not support network {}",
                    binding.name(),
                    request.network
                );
                continue;
            }

            match binding.handler().execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!("Handler {} succeeded", binding.name());
                    return Some(response);
                }
                Ok(response) => {
                    warn!(
                        "Handler {} returned error status: {}",
                        binding.name(),
                        response.message.as_deref().unwrap_or("no message")
                    );
                }
                Err(e) => {
                    warn!("Handler {} failed: {}", binding.name(), e);
                }
            }
        }

        None
    }
}
