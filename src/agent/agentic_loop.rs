//! Agent turn loop.
//!
//! Drives one user request through as many model turns as needed: stream a
//! reply from the provider, run every requested tool through the permission
//! gate, fold the results back, and repeat until the model answers without
//! calling a tool or the turn budget runs out.

use crate::agent::conversation::Conversation;
use crate::agent::permission::{Authorization, DenialReason, PermissionGate, PermissionRequest};
use crate::agent::types::*;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::mcp::{ToolCatalog, ToolServer};
use crate::providers::ProviderAdapter;

use async_trait::async_trait;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Response returned when the turn budget runs out before a final answer
pub const BUDGET_ADVISORY: &str =
    "Task may be incomplete due to reaching the maximum number of tool turns.";

/// Name recorded for a streamed tool call that arrived without one
pub const UNNAMED_TOOL: &str = "unnamed_tool";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Limits for the agent loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Model turns allowed per user request.
    pub max_turns: u32,
    /// Sleep used when a rate-limited provider does not say how long to wait.
    pub rate_limit_fallback: Duration,
    /// Consecutive rate-limit retries of one turn before the request fails.
    pub max_rate_limit_retries: u32,
}

impl LoopConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            rate_limit_fallback: config.rate_limit_fallback,
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_agent_config(&AgentConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Structured trace types
// ---------------------------------------------------------------------------

/// What happened to one requested tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDisposition {
    /// Sent to the tool server (the result may still report a failure).
    Executed,
    /// Refused by the permission gate.
    Denied(DenialReason),
    /// Arguments could not be decoded; nothing was run.
    Undecodable,
}

/// A requested tool call and the result folded back for it.
#[derive(Debug, Clone)]
pub struct ToolAction {
    pub call: ToolCallRequest,
    pub disposition: ToolDisposition,
    pub result: ToolInvocationResult,
    pub duration_ms: u64,
}

/// One model turn of the loop.
#[derive(Debug, Clone)]
pub struct LoopStep {
    pub turn: u32,
    /// Answer text streamed in this turn (may be empty).
    pub text: String,
    /// Reasoning text streamed in this turn. Display only.
    pub thought: String,
    /// Tool calls resolved in this turn, in emission order.
    pub actions: Vec<ToolAction>,
    /// Times this turn was retried after a rate limit.
    pub rate_limit_retries: u32,
    pub timestamp: Instant,
}

impl LoopStep {
    fn new(turn: u32) -> Self {
        Self {
            turn,
            text: String::new(),
            thought: String::new(),
            actions: Vec::new(),
            rate_limit_retries: 0,
            timestamp: Instant::now(),
        }
    }
}

/// Full trace of a loop execution.
#[derive(Debug, Clone)]
pub struct LoopTrace {
    pub steps: Vec<LoopStep>,
    pub outcome: LoopOutcome,
    pub total_duration_ms: u64,
}

impl LoopTrace {
    /// Number of provider invocations that produced a reply
    pub fn turns_taken(&self) -> usize {
        self.steps.len()
    }
}

/// How the loop finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model answered without requesting a tool.
    Completed,
    /// The turn budget ran out; the response is the budget advisory.
    BudgetExhausted,
    /// The model returned neither text nor tool calls.
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Callback trait
// ---------------------------------------------------------------------------

/// Hooks for rendering loop progress (streamed text, tool activity, retries).
#[async_trait]
pub trait LoopCallback: Send + Sync {
    /// Called before each model invocation; not repeated for rate-limit retries.
    async fn on_turn_start(&self, _turn: u32, _max_turns: u32) {}
    async fn on_text_delta(&self, _text: &str) {}
    async fn on_thought_delta(&self, _text: &str) {}
    /// Called before the permission gate is consulted.
    async fn on_tool_call(&self, _call: &ToolCallRequest) {}
    /// Called after a call has been executed by the tool server.
    async fn on_tool_result(&self, _result: &ToolInvocationResult) {}
    async fn on_tool_denied(&self, _call: &ToolCallRequest, _reason: DenialReason) {}
    /// Per-call failures that do not stop the loop.
    async fn on_tool_error(&self, _call: &ToolCallRequest, _error: &Error) {}
    async fn on_rate_limited(&self, _delay: Duration, _attempt: u32) {}
    /// Deltas already streamed for this turn are void; the retry streams it again.
    async fn on_reply_discarded(&self) {}
    /// Called once after the loop terminates normally.
    async fn on_loop_complete(&self, _trace: &LoopTrace) {}
}

/// Default no-op callback.
pub struct NoOpCallback;

impl NoOpCallback {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoOpCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoopCallback for NoOpCallback {}

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Everything the loop needs to run one user request.
pub struct AgentLoopInput<'a, C: LoopCallback> {
    /// Session history; the user turn is appended by the loop.
    pub conversation: &'a mut Conversation,
    pub user_input: String,
    pub provider: &'a dyn ProviderAdapter,
    pub tools: &'a dyn ToolServer,
    /// Tools discovered at session start.
    pub catalog: &'a ToolCatalog,
    pub gate: &'a mut PermissionGate,
    pub config: LoopConfig,
    pub system_prompt: &'a str,
    pub callback: &'a C,
    /// Interrupts the request; the conversation keeps only completed turns.
    pub cancel: CancellationToken,
}

/// The result of running the agent loop.
#[derive(Debug)]
pub struct AgentLoopOutput {
    /// The final answer, or the budget advisory.
    pub response: String,
    pub outcome: LoopOutcome,
    pub trace: LoopTrace,
}

// ---------------------------------------------------------------------------
// Core loop implementation
// ---------------------------------------------------------------------------

/// Run one user request to completion.
///
/// Provider failures other than rate limits, and cancellation, return `Err`
/// after truncating the conversation back to the start of the failed turn.
/// Tool failures never abort the loop; they are folded back as results.
pub async fn run_agentic_loop<C: LoopCallback>(
    input: AgentLoopInput<'_, C>,
) -> Result<AgentLoopOutput> {
    let AgentLoopInput {
        conversation,
        user_input,
        provider,
        tools,
        catalog,
        gate,
        config,
        system_prompt,
        callback,
        cancel,
    } = input;

    let loop_start = Instant::now();
    let runner = TurnRunner {
        provider,
        tools,
        catalog,
        config: &config,
        system_prompt,
        callback,
        cancel: &cancel,
    };

    conversation.add_user_message(user_input);

    let mut turn: u32 = 0;
    let mut steps: Vec<LoopStep> = Vec::new();
    let mut final_response = String::new();
    let outcome;

    loop {
        turn += 1;

        // Fail closed before invoking the provider
        if turn > config.max_turns {
            warn!("Agent turn budget of {} exhausted", config.max_turns);
            final_response = BUDGET_ADVISORY.to_string();
            outcome = LoopOutcome::BudgetExhausted;
            break;
        }

        info!("Agent loop turn {}/{}", turn, config.max_turns);
        callback.on_turn_start(turn, config.max_turns).await;

        let checkpoint = conversation.len();
        let mut step = LoopStep::new(turn);

        let reply = match runner.generate(conversation.turns(), &mut step).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Turn {} failed: {}", turn, e);
                conversation.truncate(checkpoint);
                return Err(e);
            }
        };

        step.text = reply.text.clone();
        step.thought = reply.thought.clone();

        if reply.calls.is_empty() {
            if reply.text.trim().is_empty() {
                warn!("Model returned an empty response");
                outcome = LoopOutcome::EmptyResponse;
            } else {
                conversation.push(Turn::model(reply.text.clone()));
                final_response = reply.text;
                outcome = LoopOutcome::Completed;
            }
            steps.push(step);
            break;
        }

        debug!("Turn {} requested {} tool call(s)", turn, reply.calls.len());
        conversation.push(Turn::model_units(reply.units));

        for pending in reply.calls {
            match runner.resolve(gate, pending).await {
                Ok(action) => {
                    conversation.push(Turn::tool_result(action.result.clone()));
                    step.actions.push(action);
                }
                Err(e) => {
                    warn!("Turn {} interrupted while running tools: {}", turn, e);
                    conversation.truncate(checkpoint);
                    return Err(e);
                }
            }
        }

        steps.push(step);
    }

    let total_duration_ms = loop_start.elapsed().as_millis() as u64;
    let tool_calls: usize = steps.iter().map(|s| s.actions.len()).sum();

    let trace = LoopTrace {
        steps,
        outcome,
        total_duration_ms,
    };

    callback.on_loop_complete(&trace).await;

    info!(
        "Agent loop finished: outcome={:?}, turns={}, tool_calls={}, duration={}ms",
        outcome,
        trace.turns_taken(),
        tool_calls,
        total_duration_ms,
    );

    Ok(AgentLoopOutput {
        response: final_response,
        outcome,
        trace,
    })
}

/// Shared, read-only collaborators of a single loop run.
struct TurnRunner<'a, C: LoopCallback> {
    provider: &'a dyn ProviderAdapter,
    tools: &'a dyn ToolServer,
    catalog: &'a ToolCatalog,
    config: &'a LoopConfig,
    system_prompt: &'a str,
    callback: &'a C,
    cancel: &'a CancellationToken,
}

impl<C: LoopCallback> TurnRunner<'_, C> {
    /// Stream one model reply, retrying the same turn on rate limits.
    async fn generate(&self, turns: &[Turn], step: &mut LoopStep) -> Result<ModelReply> {
        loop {
            let mut streamed = false;
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                reply = self.stream_reply(turns, &mut streamed) => reply,
            };

            match attempt {
                Err(Error::RateLimited {
                    message,
                    retry_after,
                }) if step.rate_limit_retries < self.config.max_rate_limit_retries => {
                    step.rate_limit_retries += 1;
                    let delay = retry_after.unwrap_or(self.config.rate_limit_fallback);
                    warn!(
                        "Rate limited ({}); retrying turn {} in {:?} (attempt {}/{})",
                        message,
                        step.turn,
                        delay,
                        step.rate_limit_retries,
                        self.config.max_rate_limit_retries
                    );
                    if streamed {
                        self.callback.on_reply_discarded().await;
                    }
                    self.callback
                        .on_rate_limited(delay, step.rate_limit_retries)
                        .await;

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    /// Consume one provider stream into a reply. `streamed` is set once a
    /// delta has reached the callback.
    async fn stream_reply(&self, turns: &[Turn], streamed: &mut bool) -> Result<ModelReply> {
        let mut stream = self.provider.generate(turns, self.system_prompt).await?;
        let mut reply = ModelReply::default();

        while let Some(event) = stream.next().await {
            match event {
                Ok(NormalizedEvent::TextDelta(text)) => {
                    *streamed = true;
                    self.callback.on_text_delta(&text).await;
                    reply.push_text(&text);
                }
                Ok(NormalizedEvent::ThoughtDelta(text)) => {
                    *streamed = true;
                    self.callback.on_thought_delta(&text).await;
                    reply.thought.push_str(&text);
                }
                Ok(NormalizedEvent::ToolCall(call)) if call.name.is_empty() => {
                    warn!("Skipping tool call {} with no function name", call.id);
                    let call = ToolCallRequest {
                        name: UNNAMED_TOOL.to_string(),
                        ..call
                    };
                    let error = Error::ToolArgumentDecode {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        reason: "tool call carried no function name".to_string(),
                    };
                    reply.push_call(PendingCall::Undecodable { call, error });
                }
                Ok(NormalizedEvent::ToolCall(call)) => {
                    let arguments = self.catalog.coerce_arguments(&call.name, call.arguments);
                    let call = ToolCallRequest { arguments, ..call };
                    debug!("Model requested tool {} ({})", call.name, call.id);
                    reply.push_call(PendingCall::Ready(call));
                }
                Err(Error::ToolArgumentDecode {
                    call_id,
                    name,
                    reason,
                }) => {
                    let name = if name.is_empty() {
                        UNNAMED_TOOL.to_string()
                    } else {
                        name
                    };
                    warn!("Skipping tool call {} ({}): {}", name, call_id, reason);
                    let call = ToolCallRequest::new(call_id.clone(), name.clone(), ToolArguments::new());
                    let error = Error::ToolArgumentDecode {
                        call_id,
                        name,
                        reason,
                    };
                    reply.push_call(PendingCall::Undecodable { call, error });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(reply)
    }

    /// Gate, execute or refuse one call. Only cancellation is an `Err`.
    async fn resolve(&self, gate: &mut PermissionGate, pending: PendingCall) -> Result<ToolAction> {
        let started = Instant::now();

        let (call, disposition, result) = match pending {
            PendingCall::Undecodable { call, error } => {
                self.callback.on_tool_error(&call, &error).await;
                let result = ToolInvocationResult::new(&call, format!("Error: {}", error), true);
                (call, ToolDisposition::Undecodable, result)
            }
            PendingCall::Ready(call) => {
                self.callback.on_tool_call(&call).await;

                let request = PermissionRequest {
                    tool: call.name.clone(),
                    description: self.catalog.description(&call.name).to_string(),
                    arguments: call.arguments.clone(),
                };
                let verdict = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    verdict = gate.authorize(request) => verdict,
                };

                match verdict {
                    Authorization::Allowed => {
                        let result = self.invoke(&call).await?;
                        self.callback.on_tool_result(&result).await;
                        (call, ToolDisposition::Executed, result)
                    }
                    Authorization::Denied(reason) => {
                        if reason == DenialReason::TimedOut {
                            let error = Error::PermissionTimeout(call.name.clone());
                            self.callback.on_tool_error(&call, &error).await;
                        }
                        self.callback.on_tool_denied(&call, reason).await;
                        info!("Tool {} denied ({:?})", call.name, reason);
                        let message = Authorization::denial_message(reason, &call.name);
                        let result = ToolInvocationResult::denied(&call, &message);
                        (call, ToolDisposition::Denied(reason), result)
                    }
                }
            }
        };

        Ok(ToolAction {
            call,
            disposition,
            result,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<ToolInvocationResult> {
        info!("Executing tool: {} ({})", call.name, call.arguments);

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            outcome = self.tools.invoke(&call.name, call.arguments.to_json()) => outcome,
        };

        Ok(match outcome {
            Ok(result) => ToolInvocationResult::new(call, result.joined_text(), result.is_error),
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                ToolInvocationResult::new(call, format!("Tool error: {}", e), true)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Helper types
// ---------------------------------------------------------------------------

/// A tool call waiting for the gate, in emission order.
#[derive(Debug)]
enum PendingCall {
    Ready(ToolCallRequest),
    Undecodable { call: ToolCallRequest, error: Error },
}

/// Everything one provider stream produced.
#[derive(Debug, Default)]
struct ModelReply {
    text: String,
    thought: String,
    /// Model-authored content in arrival order, echoed back on later turns.
    units: Vec<ContentUnit>,
    calls: Vec<PendingCall>,
}

impl ModelReply {
    fn push_text(&mut self, delta: &str) {
        self.text.push_str(delta);
        match self.units.last_mut() {
            Some(ContentUnit::Text(existing)) => existing.push_str(delta),
            _ => self.units.push(ContentUnit::Text(delta.to_string())),
        }
    }

    fn push_call(&mut self, pending: PendingCall) {
        let call = match &pending {
            PendingCall::Ready(call) => call,
            PendingCall::Undecodable { call, .. } => call,
        };
        self.units.push(ContentUnit::ToolCall(call.clone()));
        self.calls.push(pending);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
