//! Agent loop behaviour against scripted provider, tool server and prompt fakes.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use clia::agent::{
    run_agentic_loop, AgentLoopInput, AgentLoopOutput, Authorization, Conversation, DenialReason,
    LoopCallback, LoopConfig, LoopOutcome, NormalizedEvent, PermissionDecision, PermissionGate,
    PermissionPrompt, PermissionRecord, PermissionRequest, Role, ToolArguments, ToolCallRequest,
    ToolDisposition, ToolInvocationResult, Turn, BUDGET_ADVISORY, UNNAMED_TOOL,
};
use clia::mcp::{McpTool, McpToolResult, ToolCatalog, ToolServer};
use clia::providers::{EventStream, ProviderAdapter, ProviderKind};
use clia::{Error, Result};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

enum Reply {
    Events(Vec<Result<NormalizedEvent>>),
    Fail(Error),
    /// A stream that never yields
    Hang,
}

/// What the provider was shown on one invocation
#[derive(Debug, Clone)]
struct Seen {
    turns: usize,
    tool_calls: usize,
    tool_results: usize,
}

struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, turns: &[Turn], _system_prompt: &str) -> Result<EventStream> {
        self.seen.lock().unwrap().push(Seen {
            turns: turns.len(),
            tool_calls: turns.iter().flat_map(|t| t.tool_calls()).count(),
            tool_results: turns.iter().flat_map(|t| t.tool_results()).count(),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider script exhausted");
        match reply {
            Reply::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
            Reply::Fail(e) => Err(e),
            Reply::Hang => Ok(Box::pin(futures::stream::pending::<Result<NormalizedEvent>>())),
        }
    }
}

/// Records every invocation; optionally cancels a token and hangs instead.
#[derive(Default)]
struct RecordingTools {
    tools: Vec<McpTool>,
    invocations: Mutex<Vec<(String, Value)>>,
    cancel_on_invoke: Option<CancellationToken>,
}

impl RecordingTools {
    fn new() -> Self {
        Self {
            tools: standard_tools(),
            ..Default::default()
        }
    }

    fn invoked(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ToolServer for RecordingTools {
    async fn discover(&self) -> Result<Vec<McpTool>> {
        Ok(self.tools.clone())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        if let Some(ref cancel) = self.cancel_on_invoke {
            cancel.cancel();
            futures::future::pending::<()>().await;
        }

        match name {
            "view_directory_structure" => Ok(McpToolResult::text("project/\n├── Cargo.toml\n└── src/")),
            "execute_shell_command" => Ok(McpToolResult::text(
                "Status: Failure\nReturn Code: 2\n--- stdout ---\n\n--- stderr ---\nls: cannot access 'x'",
            )),
            other => Ok(McpToolResult::text(format!("{} ran with {}", other, arguments))),
        }
    }
}

struct ScriptedPrompt {
    answers: Mutex<VecDeque<PermissionDecision>>,
    asked: Arc<AtomicUsize>,
}

impl ScriptedPrompt {
    fn new(answers: Vec<PermissionDecision>) -> (Self, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        (
            Self {
                answers: Mutex::new(answers.into()),
                asked: Arc::clone(&asked),
            },
            asked,
        )
    }
}

#[async_trait]
impl PermissionPrompt for ScriptedPrompt {
    async fn ask(&self, _request: &PermissionRequest) -> Result<PermissionDecision> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PermissionDecision::Deny))
    }
}

struct SilentPrompt;

#[async_trait]
impl PermissionPrompt for SilentPrompt {
    async fn ask(&self, _request: &PermissionRequest) -> Result<PermissionDecision> {
        futures::future::pending().await
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RecordingCallback {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl LoopCallback for RecordingCallback {
    async fn on_turn_start(&self, turn: u32, _max_turns: u32) {
        self.push(format!("turn {}", turn));
    }
    async fn on_tool_call(&self, call: &ToolCallRequest) {
        self.push(format!("call {}", call.name));
    }
    async fn on_tool_denied(&self, call: &ToolCallRequest, reason: DenialReason) {
        self.push(format!("denied {} {:?}", call.name, reason));
    }
    async fn on_tool_error(&self, _call: &ToolCallRequest, error: &Error) {
        self.push(format!("error {}", error.label()));
    }
    async fn on_rate_limited(&self, delay: Duration, attempt: u32) {
        self.push(format!("rate limited {:?} #{}", delay, attempt));
    }
    async fn on_reply_discarded(&self) {
        self.push("discarded".to_string());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mcp_tool(name: &str, properties: Value) -> McpTool {
    serde_json::from_value(json!({
        "name": name,
        "description": format!("{} tool", name),
        "inputSchema": { "type": "object", "properties": properties }
    }))
    .unwrap()
}

fn standard_tools() -> Vec<McpTool> {
    vec![
        mcp_tool(
            "view_directory_structure",
            json!({ "path": {"type": "string"}, "max_depth": {"type": "number"} }),
        ),
        mcp_tool("read_file_content", json!({ "path": {"type": "string"} })),
        mcp_tool("execute_shell_command", json!({ "command": {"type": "string"} })),
    ]
}

fn call(id: &str, name: &str, args: Value) -> Result<NormalizedEvent> {
    Ok(NormalizedEvent::ToolCall(ToolCallRequest::new(
        id,
        name,
        ToolArguments::from_json(args).unwrap(),
    )))
}

fn text(t: &str) -> Result<NormalizedEvent> {
    Ok(NormalizedEvent::TextDelta(t.to_string()))
}

fn answer(t: &str) -> Reply {
    Reply::Events(vec![text(t)])
}

fn gate_with(prompt: impl PermissionPrompt + 'static, dir: &tempfile::TempDir) -> PermissionGate {
    PermissionGate::new(
        PermissionRecord::load(dir.path().join("permissions.json")),
        Box::new(prompt),
    )
}

fn allow_all(dir: &tempfile::TempDir) -> (PermissionGate, Arc<AtomicUsize>) {
    let (prompt, asked) = ScriptedPrompt::new(vec![PermissionDecision::AllowOnce; 16]);
    (gate_with(prompt, dir), asked)
}

struct Harness<'a> {
    conversation: &'a mut Conversation,
    provider: &'a ScriptedProvider,
    tools: &'a RecordingTools,
    gate: &'a mut PermissionGate,
    callback: &'a RecordingCallback,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl Harness<'_> {
    async fn run(self, request: &str) -> Result<AgentLoopOutput> {
        let catalog = ToolCatalog::from_tools(&self.tools.tools);
        run_agentic_loop(AgentLoopInput {
            conversation: self.conversation,
            user_input: request.to_string(),
            provider: self.provider,
            tools: self.tools,
            catalog: &catalog,
            gate: self.gate,
            config: self.config,
            system_prompt: "You are a test agent.",
            callback: self.callback,
            cancel: self.cancel,
        })
        .await
    }
}

macro_rules! harness {
    ($conversation:expr, $provider:expr, $tools:expr, $gate:expr, $callback:expr) => {
        Harness {
            conversation: &mut $conversation,
            provider: &$provider,
            tools: &$tools,
            gate: &mut $gate,
            callback: &$callback,
            config: LoopConfig::default(),
            cancel: CancellationToken::new(),
        }
    };
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_files_takes_two_invocations_and_four_turns() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("call_0", "view_directory_structure", json!({"path": "."}))]),
        answer("The project has a Cargo.toml and a src/ directory."),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("list files")
        .await
        .unwrap();

    assert_eq!(output.outcome, LoopOutcome::Completed);
    assert_eq!(output.response, "The project has a Cargo.toml and a src/ directory.");
    assert_eq!(provider.calls(), 2);
    assert_eq!(tools.invoked(), vec!["view_directory_structure"]);

    let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool, Role::Model]);
    let result = conversation.turns()[2].tool_results().next().unwrap();
    assert_eq!(result.call_id, "call_0");
    assert!(result.content.contains("Cargo.toml"));
}

#[tokio::test]
async fn test_results_follow_emission_order() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![
            call("a", "read_file_content", json!({"path": "one.txt"})),
            call("b", "view_directory_structure", json!({})),
            call("c", "read_file_content", json!({"path": "two.txt"})),
        ]),
        answer("done"),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    harness!(conversation, provider, tools, gate, callback)
        .run("read both files")
        .await
        .unwrap();

    assert_eq!(
        tools.invoked(),
        vec!["read_file_content", "view_directory_structure", "read_file_content"]
    );
    let result_ids: Vec<String> = conversation
        .turns()
        .iter()
        .flat_map(|t| t.tool_results())
        .map(|r| r.call_id.clone())
        .collect();
    assert_eq!(result_ids, vec!["a", "b", "c"]);

    // Every call was answered before the second invocation
    let second = &provider.seen()[1];
    assert_eq!(second.tool_calls, 3);
    assert_eq!(second.tool_results, 3);
    assert_eq!(second.turns, 5);
}

#[tokio::test]
async fn test_text_alongside_tool_call_is_not_final() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![
            text("Let me look first."),
            call("call_0", "view_directory_structure", json!({})),
        ]),
        answer("Here is the layout."),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("what is here?")
        .await
        .unwrap();

    assert_eq!(output.response, "Here is the layout.");
    assert_eq!(output.trace.turns_taken(), 2);
    assert_eq!(output.trace.steps[0].text, "Let me look first.");
    // The model's own text and call are echoed back together
    let model_turn = &conversation.turns()[1];
    assert_eq!(model_turn.text(), "Let me look first.");
    assert_eq!(model_turn.tool_calls().count(), 1);
}

#[tokio::test]
async fn test_budget_of_three_stops_after_three_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let replies = (0..5)
        .map(|i| {
            Reply::Events(vec![call(
                &format!("call_{}", i),
                "execute_shell_command",
                json!({"command": "ls x"}),
            )])
        })
        .collect();
    let provider = ScriptedProvider::new(replies);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let mut harness = harness!(conversation, provider, tools, gate, callback);
    harness.config = LoopConfig::default().with_max_turns(3);
    let output = harness.run("keep going").await.unwrap();

    assert_eq!(output.outcome, LoopOutcome::BudgetExhausted);
    assert_eq!(output.response, BUDGET_ADVISORY);
    assert_eq!(provider.calls(), 3);
    assert_eq!(tools.invoked().len(), 3);
    assert_eq!(
        callback.events().iter().filter(|e| e.starts_with("turn")).count(),
        3
    );

    // Failed tool executions are ordinary results
    let last = conversation.turns().last().unwrap().tool_results().next().unwrap();
    assert!(!last.is_error);
    assert!(!last.succeeded());
}

#[tokio::test]
async fn test_allow_always_prompts_once_and_persists_once() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("a", "read_file_content", json!({"path": "x"}))]),
        Reply::Events(vec![call("b", "read_file_content", json!({"path": "y"}))]),
        answer("read both"),
        Reply::Events(vec![call("c", "read_file_content", json!({"path": "z"}))]),
        answer("read again"),
    ]);
    let tools = RecordingTools::new();
    let (prompt, asked) = ScriptedPrompt::new(vec![
        PermissionDecision::AllowAlways,
        PermissionDecision::AllowAlways,
    ]);
    let mut gate = gate_with(prompt, &dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    harness!(conversation, provider, tools, gate, callback)
        .run("read x and y")
        .await
        .unwrap();
    harness!(conversation, provider, tools, gate, callback)
        .run("read z")
        .await
        .unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(tools.invoked().len(), 3);
    assert_eq!(gate.record().tools(), ["read_file_content".to_string()]);

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("permissions.json")).unwrap())
            .unwrap();
    assert_eq!(saved["always_allowed"], json!(["read_file_content"]));
}

#[tokio::test]
async fn test_denied_call_still_gets_a_result() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("call_0", "execute_shell_command", json!({"command": "rm -rf /"}))]),
        answer("Understood, I will not run that."),
    ]);
    let tools = RecordingTools::new();
    let (prompt, _) = ScriptedPrompt::new(vec![PermissionDecision::Deny]);
    let mut gate = gate_with(prompt, &dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("clean up")
        .await
        .unwrap();

    assert!(tools.invoked().is_empty());
    assert_eq!(output.outcome, LoopOutcome::Completed);
    assert_eq!(
        output.trace.steps[0].actions[0].disposition,
        ToolDisposition::Denied(DenialReason::User)
    );

    let result: &ToolInvocationResult =
        conversation.turns()[2].tool_results().next().unwrap();
    assert_eq!(result.call_id, "call_0");
    assert!(result.is_error);
    let payload: Value = serde_json::from_str(&result.content).unwrap();
    assert_eq!(payload["status"], "denied");
    assert_eq!(
        payload["message"],
        Authorization::denial_message(DenialReason::User, "execute_shell_command")
    );

    let second = &provider.seen()[1];
    assert_eq!(second.tool_calls, second.tool_results);
}

#[tokio::test(start_paused = true)]
async fn test_permission_timeout_is_denial_and_loop_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("call_0", "read_file_content", json!({"path": "a"}))]),
        answer("No permission, so I stopped."),
    ]);
    let tools = RecordingTools::new();
    let mut gate = gate_with(SilentPrompt, &dir).with_timeout(Some(Duration::from_secs(300)));
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("read a")
        .await
        .unwrap();

    assert_eq!(output.outcome, LoopOutcome::Completed);
    assert_eq!(provider.calls(), 2);
    assert!(tools.invoked().is_empty());
    assert_eq!(
        output.trace.steps[0].actions[0].disposition,
        ToolDisposition::Denied(DenialReason::TimedOut)
    );
    let events = callback.events();
    assert!(events.contains(&"error Permission Timeout".to_string()));
    assert!(events.contains(&"denied read_file_content TimedOut".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retries_same_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("call_0", "view_directory_structure", json!({}))]),
        Reply::Fail(Error::RateLimited {
            message: "too many requests".into(),
            retry_after: Some(Duration::from_secs(5)),
        }),
        answer("done"),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let started = tokio::time::Instant::now();
    let output = harness!(conversation, provider, tools, gate, callback)
        .run("look around")
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(output.outcome, LoopOutcome::Completed);
    assert_eq!(provider.calls(), 3);
    assert_eq!(output.trace.turns_taken(), 2);
    assert_eq!(output.trace.steps[1].turn, 2);
    assert_eq!(output.trace.steps[1].rate_limit_retries, 1);
    assert_eq!(
        callback.events(),
        vec![
            "turn 1".to_string(),
            "call view_directory_structure".to_string(),
            "turn 2".to_string(),
            "rate limited 5s #1".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_mid_stream_discards_partial_reply() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![
            text("The project"),
            Err(Error::RateLimited {
                message: "too many tokens".into(),
                retry_after: Some(Duration::from_secs(2)),
            }),
        ]),
        answer("The project has two files."),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("describe it")
        .await
        .unwrap();

    assert_eq!(output.response, "The project has two files.");
    assert_eq!(conversation.len(), 2);
    assert_eq!(
        callback.events(),
        vec![
            "turn 1".to_string(),
            "discarded".to_string(),
            "rate limited 2s #1".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_gives_up_after_retry_cap() {
    let dir = tempfile::tempdir().unwrap();
    let replies = (0..3)
        .map(|_| {
            Reply::Fail(Error::RateLimited {
                message: "slow down".into(),
                retry_after: None,
            })
        })
        .collect();
    let provider = ScriptedProvider::new(replies);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let mut harness = harness!(conversation, provider, tools, gate, callback);
    harness.config.max_rate_limit_retries = 2;
    let started = tokio::time::Instant::now();
    let err = harness.run("hello").await.unwrap_err();

    assert!(matches!(err, Error::RateLimited { .. }));
    assert_eq!(provider.calls(), 3);
    // Fallback delay used twice
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert_eq!(conversation.len(), 1);
}

#[tokio::test]
async fn test_provider_error_rolls_back_failed_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("call_0", "read_file_content", json!({"path": "a"}))]),
        Reply::Events(vec![text("partial "), Err(Error::ProviderTransport("stream reset".into()))]),
        answer("hi again"),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let err = harness!(conversation, provider, tools, gate, callback)
        .run("read a")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderTransport(_)));
    assert_eq!(err.label(), "Provider Error");

    // user, model-with-call, tool-result survive; nothing from the failed turn
    assert_eq!(conversation.len(), 3);
    assert!(conversation.turns().iter().all(|t| !t.text().contains("partial")));

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("hello?")
        .await
        .unwrap();
    assert_eq!(output.response, "hi again");
    assert_eq!(conversation.len(), 5);
}

#[tokio::test]
async fn test_undecodable_arguments_are_reported_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![
            Err(Error::ToolArgumentDecode {
                call_id: "call_0".into(),
                name: "read_file_content".into(),
                reason: "expected `,` or `}`".into(),
            }),
            call("call_1", "view_directory_structure", json!({})),
        ]),
        answer("recovered"),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, asked) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("read it")
        .await
        .unwrap();

    assert_eq!(output.response, "recovered");
    assert_eq!(tools.invoked(), vec!["view_directory_structure"]);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(output.trace.steps[0].actions[0].disposition, ToolDisposition::Undecodable);

    let results: Vec<&ToolInvocationResult> =
        conversation.turns().iter().flat_map(|t| t.tool_results()).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].call_id, "call_0");
    assert!(results[0].is_error);
    assert!(results[0].content.starts_with("Error: "));
    assert!(callback.events().contains(&"error Tool Argument Error".to_string()));
}

#[tokio::test]
async fn test_nameless_calls_are_answered_under_a_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![
            call("call_0", "", json!({"path": "a"})),
            Err(Error::ToolArgumentDecode {
                call_id: "call_1".into(),
                name: String::new(),
                reason: "tool call carried no function name".into(),
            }),
        ]),
        answer("done"),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, asked) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("do something")
        .await
        .unwrap();

    assert_eq!(output.response, "done");
    assert!(tools.invoked().is_empty());
    assert_eq!(asked.load(Ordering::SeqCst), 0);

    let calls: Vec<&ToolCallRequest> =
        conversation.turns().iter().flat_map(|t| t.tool_calls()).collect();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.name == UNNAMED_TOOL));

    let results: Vec<&ToolInvocationResult> =
        conversation.turns().iter().flat_map(|t| t.tool_results()).collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.name == UNNAMED_TOOL && r.is_error));
}

#[tokio::test]
async fn test_arguments_are_coerced_to_declared_types() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call(
            "call_0",
            "view_directory_structure",
            json!({"path": "src", "max_depth": "2"}),
        )]),
        answer("ok"),
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    harness!(conversation, provider, tools, gate, callback)
        .run("show src")
        .await
        .unwrap();

    let invocations = tools.invocations.lock().unwrap();
    assert_eq!(invocations[0].1, json!({"path": "src", "max_depth": 2}));
}

#[tokio::test]
async fn test_empty_reply_appends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Events(vec![Ok(
        NormalizedEvent::ThoughtDelta("hmm".into()),
    )])]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let output = harness!(conversation, provider, tools, gate, callback)
        .run("anything?")
        .await
        .unwrap();

    assert_eq!(output.outcome, LoopOutcome::EmptyResponse);
    assert_eq!(output.trace.steps[0].thought, "hmm");
    assert_eq!(conversation.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_streaming_keeps_completed_turns() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![
        Reply::Events(vec![call("call_0", "view_directory_structure", json!({}))]),
        Reply::Hang,
    ]);
    let tools = RecordingTools::new();
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut harness = harness!(conversation, provider, tools, gate, callback);
    harness.cancel = cancel;
    let err = harness.run("look").await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(provider.calls(), 2);
    let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool]);
}

#[tokio::test]
async fn test_cancel_while_executing_tools_drops_partial_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new(vec![Reply::Events(vec![
        call("call_0", "read_file_content", json!({"path": "a"})),
        call("call_1", "read_file_content", json!({"path": "b"})),
    ])]);
    let cancel = CancellationToken::new();
    let tools = RecordingTools {
        cancel_on_invoke: Some(cancel.clone()),
        ..RecordingTools::new()
    };
    let (mut gate, _) = allow_all(&dir);
    let callback = RecordingCallback::default();
    let mut conversation = Conversation::new();

    let mut harness = harness!(conversation, provider, tools, gate, callback);
    harness.cancel = cancel;
    let err = harness.run("read a and b").await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(tools.invoked(), vec!["read_file_content"]);
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation.turns()[0].role, Role::User);
}

#[tokio::test]
async fn test_zero_tools_is_fatal_before_any_model_call() {
    let provider = ScriptedProvider::new(vec![answer("unreachable")]);
    let tools = RecordingTools::default();

    let err = ToolCatalog::discover(&tools).await.unwrap_err();

    assert!(matches!(err, Error::ToolDiscovery(_)));
    assert!(err.is_fatal());
    assert_eq!(provider.calls(), 0);
}
