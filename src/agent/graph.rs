//! Agent execution graph.
//!
//! An explicit state machine over persisted [`SessionState`] rather than
//! coroutine interrupts: every node appends messages, routing functions are
//! pure, and the human-review node suspends by checkpointing state and
//! returning. Resuming feeds a [`ReviewDecision`] back in and continues
//! from exactly that point.
//!
//! Nodes: `Agent` (model call) → `Tools` (batch tool execution) →
//! `HumanReview` (suspend point) → `FinalAnswer` (word-by-word emission).

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tool::{invoke, Tool, ToolDefinition, ToolOutput};
use crate::Result;

use super::checkpoint::Checkpointer;
use super::events::{AgentEvent, EventSink, FINAL_MESSAGE, REVIEW_DATA, REVIEW_TEXT};
use super::llm::ChatModel;
use super::message::{Message, Role};

/// Delay between word emissions in the final answer node.
const WORD_DELAY: Duration = Duration::from_millis(50);

const REVIEW_SYSTEM_PROMPT: &str = "Write a question that you can ask the human to review \
this onchain transaction. You must show the information in a way that is easy for a human \
to understand.";

/// Graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    Agent,
    Tools,
    HumanReview,
    FinalAnswer,
    End,
}

/// A review waiting on a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub question: String,
    pub tool_name: String,
    pub tool_output: String,
}

/// Persisted per-session execution state, keyed by thread id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub pending_review: Option<PendingReview>,
}

impl SessionState {
    pub fn new(system_message: Option<&str>) -> Self {
        let messages = system_message
            .map(|text| vec![Message::system(text)])
            .unwrap_or_default();
        Self {
            messages,
            pending_review: None,
        }
    }

    pub fn has_pending_review(&self) -> bool {
        self.pending_review.is_some()
    }
}

/// Human decision resolving a pending review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ReviewAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self {
            action: Some(ReviewAction::Approve),
            text: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            action: Some(ReviewAction::Reject),
            text: None,
        }
    }

    /// Map the decision to the human-facing transcript message.
    fn response_text(&self) -> String {
        match self.action {
            Some(ReviewAction::Approve) => "I approve the tool call".to_string(),
            Some(ReviewAction::Reject) => "I reject the tool call".to_string(),
            None => self
                .text
                .clone()
                .unwrap_or_else(|| "Do you want to approve this action?".to_string()),
        }
    }
}

/// Everything the graph needs to run, fixed at agent initialization.
#[derive(Clone)]
pub(crate) struct GraphRuntime {
    pub model: Arc<dyn ChatModel>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub checkpointer: Arc<dyn Checkpointer>,
}

impl GraphRuntime {
    fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }
}

/// Route after the model responds: tool calls continue, text finishes.
fn route_after_agent(messages: &[Message]) -> GraphNode {
    match messages.last() {
        Some(last) if last.has_tool_calls() => GraphNode::Tools,
        _ => GraphNode::FinalAnswer,
    }
}

/// Route after tool execution.
///
/// "Most recent result" is the last tool call in the order the model issued
/// them; the tools node preserves that order, so this check is stable even
/// when calls run concurrently.
fn route_after_tools(outputs: &[ToolOutput]) -> GraphNode {
    match outputs.last() {
        Some(last) if last.requires_review => GraphNode::HumanReview,
        _ => GraphNode::Agent,
    }
}

/// Run the graph to completion or suspension.
///
/// `resume` carries the human decision when continuing a suspended session;
/// the caller validates resume-versus-new-input consistency before calling.
pub(crate) async fn run(
    rt: GraphRuntime,
    mut state: SessionState,
    mut resume: Option<ReviewDecision>,
    thread_id: String,
    events: EventSink,
) -> Result<()> {
    let mut node = if state.has_pending_review() {
        GraphNode::HumanReview
    } else {
        GraphNode::Agent
    };

    loop {
        debug!("Graph node: {:?}", node);
        node = match node {
            GraphNode::Agent => agent_node(&rt, &mut state).await?,

            GraphNode::Tools => tools_node(&rt, &mut state).await?,

            GraphNode::HumanReview => {
                if let Some(decision) = resume.take() {
                    resolve_review(&mut state, decision)?
                } else {
                    suspend_for_review(&rt, &mut state, &thread_id, &events).await?;
                    return Ok(());
                }
            }

            GraphNode::FinalAnswer => final_answer_node(&state, &events).await,

            GraphNode::End => {
                rt.checkpointer.save(&thread_id, &state).await?;
                info!("Graph execution completed for thread {thread_id}");
                return Ok(());
            }
        };
    }
}

/// Model call: bind the tool set, invoke with full history, append exactly
/// one AI message. Model errors propagate uncaught.
async fn agent_node(rt: &GraphRuntime, state: &mut SessionState) -> Result<GraphNode> {
    let definitions = rt.definitions();
    let response = rt.model.chat(&state.messages, &definitions).await?;

    let message = if response.has_tool_calls() {
        Message::ai_with_tools(
            response.content.clone().unwrap_or_default(),
            response.tool_calls,
        )
    } else {
        Message::ai(response.content.unwrap_or_default())
    };
    state.messages.push(message);

    Ok(route_after_agent(&state.messages))
}

/// Execute every tool call from the latest AI message.
///
/// Calls fan out concurrently; results are appended in the order the model
/// issued the calls.
async fn tools_node(rt: &GraphRuntime, state: &mut SessionState) -> Result<GraphNode> {
    let calls = state
        .messages
        .last()
        .and_then(|m| m.tool_calls.clone())
        .unwrap_or_default();

    let outputs = join_all(calls.iter().map(|call| async move {
        match rt.tool(&call.name) {
            Some(tool) => invoke(tool.as_ref(), call.arguments.clone()).await,
            None => {
                warn!("Model requested unknown tool: {}", call.name);
                ToolOutput::error(format!("Unknown tool: {}", call.name))
            }
        }
    }))
    .await;

    for (call, output) in calls.iter().zip(&outputs) {
        let content = serde_json::to_string(output)?;
        state
            .messages
            .push(Message::tool_result(&call.id, &call.name, content));
    }

    Ok(route_after_tools(&outputs))
}

/// Suspend path of the review node: surface the raw tool output, stream a
/// model-composed review question, checkpoint, and stop.
async fn suspend_for_review(
    rt: &GraphRuntime,
    state: &mut SessionState,
    thread_id: &str,
    events: &EventSink,
) -> Result<()> {
    let tool_message = state
        .messages
        .last()
        .filter(|m| m.role == Role::Tool)
        .cloned()
        .ok_or_else(|| Error::Session("review requested without a tool result".to_string()))?;

    events
        .emit(AgentEvent::custom(REVIEW_DATA, &tool_message.content))
        .await;

    let question = compose_review_question(rt, &tool_message, events).await?;

    state.pending_review = Some(PendingReview {
        question,
        tool_name: tool_message.name.clone().unwrap_or_default(),
        tool_output: tool_message.content,
    });
    rt.checkpointer.save(thread_id, state).await?;
    info!("Execution suspended for human review on thread {thread_id}");
    Ok(())
}

/// Ask the model to phrase the pending action for human review, streaming
/// the text chunk by chunk.
async fn compose_review_question(
    rt: &GraphRuntime,
    tool_message: &Message,
    events: &EventSink,
) -> Result<String> {
    let data = serde_json::from_str::<ToolOutput>(&tool_message.content)
        .ok()
        .and_then(|output| output.data)
        .unwrap_or(Value::Null);

    let prompt = vec![
        Message::system(REVIEW_SYSTEM_PROMPT),
        Message::human(format!(
            "Tool name: {}\nTool response: {}",
            tool_message.name.as_deref().unwrap_or("unknown"),
            data
        )),
    ];

    let mut stream = rt.model.chat_stream(&prompt).await?;
    let mut question = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        question.push_str(&chunk);
        events.emit(AgentEvent::custom(REVIEW_TEXT, chunk)).await;
    }

    Ok(question)
}

/// Resume path of the review node: append the question and the mapped human
/// decision so the transcript reads coherently, then return to the model.
fn resolve_review(state: &mut SessionState, decision: ReviewDecision) -> Result<GraphNode> {
    let review = state
        .pending_review
        .take()
        .ok_or_else(|| Error::Session("no pending review to resolve".to_string()))?;

    state.messages.push(Message::ai(review.question));
    state.messages.push(Message::human(decision.response_text()));

    Ok(GraphNode::Agent)
}

/// Emit the final AI message word by word.
async fn final_answer_node(state: &SessionState, events: &EventSink) -> GraphNode {
    let text = state
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Ai)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    for word in text.split_whitespace() {
        tokio::time::sleep(WORD_DELAY).await;
        events.emit(AgentEvent::custom(FINAL_MESSAGE, word)).await;
    }

    GraphNode::End
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::checkpoint::MemoryCheckpointer;
    use crate::agent::llm::{ChatResponse, FakeChatModel};
    use crate::tool::testing::ScriptedTool;
    use crate::tool::ToolStatus;
    use serde_json::json;
    use tokio_stream::StreamExt as _;

    fn runtime(
        model: FakeChatModel,
        tools: Vec<Arc<dyn Tool>>,
        checkpointer: Arc<MemoryCheckpointer>,
    ) -> GraphRuntime {
        GraphRuntime {
            model: Arc::new(model),
            tools,
            checkpointer,
        }
    }

    async fn collect(stream: crate::agent::events::EventStream) -> Vec<AgentEvent> {
        tokio_stream::StreamExt::collect(stream).await
    }

    #[test]
    fn test_route_after_agent() {
        let mut messages = vec![Message::human("hi"), Message::ai("done")];
        assert_eq!(route_after_agent(&messages), GraphNode::FinalAnswer);

        messages.push(Message::ai_with_tools(
            "",
            vec![crate::agent::message::ToolCallRequest {
                id: "tc_1".to_string(),
                name: "get_balance".to_string(),
                arguments: json!({}),
            }],
        ));
        assert_eq!(route_after_agent(&messages), GraphNode::Tools);
    }

    #[test]
    fn test_route_after_tools_checks_last_output() {
        let plain = ToolOutput::success(json!({}));
        let review = ToolOutput::success_for_review(json!({}));

        assert_eq!(route_after_tools(&[plain.clone()]), GraphNode::Agent);
        assert_eq!(
            route_after_tools(&[plain.clone(), review.clone()]),
            GraphNode::HumanReview
        );
        // review flag on a non-final result does not trigger review
        assert_eq!(route_after_tools(&[review, plain]), GraphNode::Agent);
        assert_eq!(route_after_tools(&[]), GraphNode::Agent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_text_answer_streams_words() {
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let rt = runtime(
            FakeChatModel::new(vec!["Hello there friend"]),
            vec![],
            checkpointer.clone(),
        );

        let mut state = SessionState::new(None);
        state.messages.push(Message::human("Hi"));

        let (sink, stream) = EventSink::channel(1024);
        run(rt, state, None, "t1".to_string(), sink).await.unwrap();

        let events = collect(stream).await;
        let words: Vec<&str> = events
            .iter()
            .filter(|e| e.name == FINAL_MESSAGE)
            .map(|e| e.content())
            .collect();
        assert_eq!(words, vec!["Hello", "there", "friend"]);

        let saved = checkpointer.load("t1").await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 2);
        assert_eq!(saved.messages[1].content, "Hello there friend");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_loop_appends_result_and_returns_to_model() {
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let tool: Arc<dyn Tool> = Arc::new(ScriptedTool::new(
            "get_balance",
            ToolOutput::success(json!({"balance": "1.5"})),
        ));
        let rt = runtime(
            FakeChatModel::scripted(vec![
                FakeChatModel::tool_call_response("get_balance", json!({"network": "solana"})),
                ChatResponse::text("You have 1.5 SOL"),
            ]),
            vec![tool],
            checkpointer.clone(),
        );

        let mut state = SessionState::new(None);
        state.messages.push(Message::human("What is my balance?"));

        let (sink, stream) = EventSink::channel(1024);
        run(rt, state, None, "t1".to_string(), sink).await.unwrap();
        drop(collect(stream).await);

        let saved = checkpointer.load("t1").await.unwrap().unwrap();
        // human, ai tool-call, tool result, final ai
        assert_eq!(saved.messages.len(), 4);
        assert_eq!(saved.messages[2].role, Role::Tool);
        let output: ToolOutput = serde_json::from_str(&saved.messages[2].content).unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(saved.messages[3].content, "You have 1.5 SOL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tool_becomes_error_result() {
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let rt = runtime(
            FakeChatModel::scripted(vec![
                FakeChatModel::tool_call_response("no_such_tool", json!({})),
                ChatResponse::text("sorry"),
            ]),
            vec![],
            checkpointer.clone(),
        );

        let mut state = SessionState::new(None);
        state.messages.push(Message::human("go"));

        let (sink, stream) = EventSink::channel(1024);
        run(rt, state, None, "t1".to_string(), sink).await.unwrap();
        drop(collect(stream).await);

        let saved = checkpointer.load("t1").await.unwrap().unwrap();
        let output: ToolOutput = serde_json::from_str(&saved.messages[2].content).unwrap();
        assert_eq!(output.status, ToolStatus::Error);
        assert!(output.message.unwrap().contains("no_such_tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_suspends_and_resumes_with_approval() {
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let quote_tool: Arc<dyn Tool> = Arc::new(ScriptedTool::new(
            "get_swap_quote",
            ToolOutput::success_for_review(json!({"quoteId": "q-1"})),
        ));

        // first execution: tool call, then the review question composition
        let rt = runtime(
            FakeChatModel::scripted(vec![
                FakeChatModel::tool_call_response("get_swap_quote", json!({"fromToken": "SOL"})),
                ChatResponse::text("Approve swapping 0.1 SOL for USDC?"),
            ]),
            vec![quote_tool.clone()],
            checkpointer.clone(),
        );

        let mut state = SessionState::new(None);
        state.messages.push(Message::human("Swap 0.1 SOL to USDC"));

        let (sink, stream) = EventSink::channel(1024);
        run(rt, state, None, "t1".to_string(), sink).await.unwrap();
        let events = collect(stream).await;

        // raw data event first, then the streamed question text
        assert_eq!(events[0].name, REVIEW_DATA);
        assert!(events[0].content().contains("needHumanConfirmation"));
        let question: String = events
            .iter()
            .filter(|e| e.name == REVIEW_TEXT)
            .map(|e| e.content())
            .collect();
        assert_eq!(question, "Approve swapping 0.1 SOL for USDC?");
        assert!(events.iter().all(|e| e.name != FINAL_MESSAGE));

        let suspended = checkpointer.load("t1").await.unwrap().unwrap();
        let review = suspended.pending_review.as_ref().unwrap();
        assert_eq!(review.tool_name, "get_swap_quote");
        assert_eq!(review.question, "Approve swapping 0.1 SOL for USDC?");

        // resume with approval: control returns to the agent node
        let rt = runtime(
            FakeChatModel::scripted(vec![ChatResponse::text("Swap submitted")]),
            vec![quote_tool],
            checkpointer.clone(),
        );
        let (sink, stream) = EventSink::channel(1024);
        run(
            rt,
            suspended,
            Some(ReviewDecision::approve()),
            "t1".to_string(),
            sink,
        )
        .await
        .unwrap();
        let events = collect(stream).await;

        let words: Vec<&str> = events
            .iter()
            .filter(|e| e.name == FINAL_MESSAGE)
            .map(|e| e.content())
            .collect();
        assert_eq!(words, vec!["Swap", "submitted"]);

        let finished = checkpointer.load("t1").await.unwrap().unwrap();
        assert!(!finished.has_pending_review());

        // the approval appears as a human message right after the question
        let position = finished
            .messages
            .iter()
            .position(|m| m.content == "Approve swapping 0.1 SOL for USDC?")
            .unwrap();
        assert_eq!(finished.messages[position].role, Role::Ai);
        assert_eq!(finished.messages[position + 1].role, Role::Human);
        assert_eq!(finished.messages[position + 1].content, "I approve the tool call");
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_rejection_text() {
        let decision = ReviewDecision::reject();
        assert_eq!(decision.response_text(), "I reject the tool call");

        let free_text = ReviewDecision {
            action: None,
            text: Some("Only if fees are low".to_string()),
        };
        assert_eq!(free_text.response_text(), "Only if fees are low");

        let default = ReviewDecision::default();
        assert_eq!(default.response_text(), "Do you want to approve this action?");
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_error_propagates() {
        let checkpointer = Arc::new(MemoryCheckpointer::new());
        let rt = runtime(FakeChatModel::new(vec![]), vec![], checkpointer);

        let mut state = SessionState::new(None);
        state.messages.push(Message::human("hi"));

        let (sink, _stream) = EventSink::channel(1024);
        let result = run(rt, state, None, "t1".to_string(), sink).await;
        assert!(matches!(result, Err(Error::Model(_))));
    }
}
