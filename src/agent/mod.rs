//! Agent - orchestrates services, plugins, the model, and the execution
//! graph behind a streaming `execute` entrypoint keyed by session.
//!
//! Initialization order is fixed: services produce handlers, plugins bind
//! handlers into tools, the model client is constructed, and the graph
//! runtime is assembled. Any failure aborts the whole sequence and leaves
//! the agent unusable.

pub mod checkpoint;
pub mod events;
pub mod graph;
pub mod llm;
pub mod message;

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{AgentPluginConfig, ModelConfig};
use crate::error::Error;
use crate::handler::{HandlerBinding, HandlerConfig};
use crate::network::NetworkManager;
use crate::plugin::{Plugin, PluginContext};
use crate::service::Service;
use crate::tool::Tool;
use crate::wallet::Wallet;
use crate::Result;

use checkpoint::{Checkpointer, MemoryCheckpointer};
use events::{EventSink, EventStream};
use graph::{GraphRuntime, ReviewDecision, SessionState};
use llm::{ChatModel, ModelRegistry};
use message::Message;

/// External collaborators every tool can reach through its plugin.
pub struct AgentDependencies {
    pub wallet: Arc<dyn Wallet>,
    pub network: Arc<NetworkManager>,
}

/// Agent-level configuration.
pub struct AgentConfig {
    pub model: ModelConfig,
    pub system_message: Option<String>,
}

/// Session addressing for one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
}

impl SessionConfig {
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            user_id: None,
        }
    }
}

/// Input to `execute`: fresh conversation turns, or a decision resuming a
/// suspended review.
pub enum ExecuteInput {
    Messages(Vec<Message>),
    Resume(ReviewDecision),
}

impl ExecuteInput {
    pub fn text(content: impl Into<String>) -> Self {
        ExecuteInput::Messages(vec![Message::human(content)])
    }
}

struct Runtime {
    model: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
}

/// The agent.
pub struct Agent {
    id: Uuid,
    config: AgentConfig,
    deps: Arc<AgentDependencies>,
    services: Vec<Box<dyn Service>>,
    plugins: Vec<Box<dyn Plugin>>,
    checkpointer: Arc<dyn Checkpointer>,
    runtime: Option<Runtime>,
}

impl Agent {
    pub fn new(config: AgentConfig, deps: AgentDependencies) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            deps: Arc::new(deps),
            services: Vec::new(),
            plugins: Vec::new(),
            checkpointer: Arc::new(MemoryCheckpointer::new()),
            runtime: None,
        }
    }

    /// Swap in a persistent checkpoint backend.
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) {
        self.services.push(service);
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dependencies(&self) -> &Arc<AgentDependencies> {
        &self.deps
    }

    /// Tools exposed to the model; empty before initialization.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.runtime
            .as_ref()
            .map(|rt| rt.tools.clone())
            .unwrap_or_default()
    }

    /// Wire services, plugins, model, and graph runtime. Fail-fast: any
    /// stage error aborts the sequence and the agent stays unusable.
    pub async fn initialize(&mut self, plugin_config: Option<&AgentPluginConfig>) -> Result<()> {
        info!("Initializing agent {}", self.id);
        self.runtime = None;

        let handlers = self.initialize_services(plugin_config).await?;
        debug!("Initialized {} handlers from services", handlers.len());

        let tools = self.initialize_plugins(&handlers, plugin_config).await?;
        debug!("Initialized {} tools from plugins", tools.len());

        let model = ModelRegistry::create(&self.config.model)?;
        info!("Model {} ready", model.model_name());

        self.runtime = Some(Runtime { model, tools });
        info!("Agent initialization completed");
        Ok(())
    }

    async fn initialize_services(
        &mut self,
        plugin_config: Option<&AgentPluginConfig>,
    ) -> Result<Vec<HandlerBinding>> {
        if self.services.is_empty() {
            debug!("No services to initialize");
            return Ok(Vec::new());
        }

        // resolve per-service configs by name before fan-out
        let configs: Vec<Vec<HandlerConfig>> = self
            .services
            .iter()
            .map(|service| {
                plugin_config
                    .and_then(|c| c.service_config(&service.metadata().name))
                    .map(|sc| sc.tools.clone())
                    .unwrap_or_default()
            })
            .collect();

        let results = try_join_all(self.services.iter_mut().zip(configs).map(
            |(service, configs)| async move {
                let name = service.metadata().name.clone();
                info!("Initializing service: {name}");
                service
                    .initialize(&configs)
                    .await
                    .map_err(|e| Error::service(name.as_str(), e.to_string()))?;
                let handlers = service.handlers();
                debug!("Service {name} initialized with {} handlers", handlers.len());
                Ok::<_, Error>(handlers)
            },
        ))
        .await?;

        Ok(results.into_iter().flatten().collect())
    }

    async fn initialize_plugins(
        &mut self,
        handlers: &[HandlerBinding],
        plugin_config: Option<&AgentPluginConfig>,
    ) -> Result<Vec<Arc<dyn Tool>>> {
        if self.plugins.is_empty() {
            debug!("No plugins to initialize");
            return Ok(Vec::new());
        }

        let peers: Vec<String> = self
            .plugins
            .iter()
            .map(|p| p.metadata().name.clone())
            .collect();
        let deps = self.deps.clone();

        let tool_sets = try_join_all(self.plugins.iter_mut().map(|plugin| {
            let ctx = PluginContext {
                deps: deps.clone(),
                peer_plugins: peers.clone(),
            };
            async move {
                let name = plugin.metadata().name.clone();
                info!("Initializing plugin: {name}");
                plugin.initialize(ctx, handlers).await?;

                if !plugin.attached() {
                    return Err(Error::plugin(name.as_str(), "failed to initialize properly"));
                }

                let allowed = plugin_config
                    .and_then(|c| c.plugin_config(&name))
                    .and_then(|entry| entry.tools.clone());

                let tools: Vec<Arc<dyn Tool>> = plugin
                    .tools()
                    .into_iter()
                    .filter(|tool| {
                        allowed
                            .as_ref()
                            .map(|names| names.iter().any(|n| n == tool.name()))
                            .unwrap_or(true)
                    })
                    .collect();
                debug!("Added {} tools from plugin {name}", tools.len());
                Ok::<_, Error>(tools)
            }
        }))
        .await?;

        Ok(tool_sets.into_iter().flatten().collect())
    }

    /// Run one execution turn, returning a stream of events.
    ///
    /// The session is created implicitly on first use; a suspended session
    /// is continued by passing `ExecuteInput::Resume` with the same thread
    /// id. Graph errors after the stream is handed out are logged and end
    /// the stream.
    pub async fn execute(
        &self,
        input: ExecuteInput,
        session: SessionConfig,
    ) -> Result<EventStream> {
        let runtime = self.runtime.as_ref().ok_or(Error::NotInitialized)?;

        let thread_id = session
            .thread_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user_id = session.user_id.unwrap_or_else(|| "anonymous".to_string());
        info!("Executing agent for thread {thread_id} (user {user_id})");

        let existing = self.checkpointer.load(&thread_id).await?;
        let (state, resume) = match input {
            ExecuteInput::Messages(messages) => {
                let mut state = existing.unwrap_or_else(|| {
                    SessionState::new(self.config.system_message.as_deref())
                });
                if state.has_pending_review() {
                    return Err(Error::Session(format!(
                        "thread {thread_id} is awaiting review; resume with a decision"
                    )));
                }
                state.messages.extend(messages);
                (state, None)
            }
            ExecuteInput::Resume(decision) => {
                let state = existing.ok_or_else(|| {
                    Error::Session(format!("no session found for thread {thread_id}"))
                })?;
                if !state.has_pending_review() {
                    return Err(Error::Session(format!(
                        "thread {thread_id} has no pending review"
                    )));
                }
                (state, Some(decision))
            }
        };

        let rt = GraphRuntime {
            model: runtime.model.clone(),
            tools: runtime.tools.clone(),
            checkpointer: self.checkpointer.clone(),
        };
        let (sink, stream) = EventSink::channel(64);
        let task_thread = thread_id.clone();
        tokio::spawn(async move {
            if let Err(e) = graph::run(rt, state, resume, task_thread, sink).await {
                error!("Agent execution failed: {e}");
            }
        });

        Ok(stream)
    }

    #[cfg(test)]
    pub(crate) fn set_model(&mut self, model: Arc<dyn ChatModel>) {
        if let Some(rt) = self.runtime.as_mut() {
            rt.model = model;
        }
    }
}
