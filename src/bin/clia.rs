//! CLIA CLI
//!
//! Interactive terminal chat with a tool-using agent, plus onboarding and
//! tool inspection commands.

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use clia::agent::{
    build_system_prompt, load_system_prompt, run_agentic_loop, AgentLoopInput, Conversation,
    DenialReason, LoopCallback, LoopConfig, LoopOutcome, LoopTrace, PermissionDecision,
    PermissionGate, PermissionPrompt, PermissionRecord, PermissionRequest, ToolCallRequest,
    ToolInvocationResult,
};
use clia::config::{
    config_path, load_config, save_config, validate_config, Config, ProviderKind,
};
use clia::mcp::{McpClient, ToolCatalog};
use clia::providers::build_adapter;
use clia::{Error, Result, VERSION};

#[derive(Parser)]
#[command(
    name = "clia",
    author = "CLIA Contributors",
    version = VERSION,
    about = "CLIA - terminal chat agent with MCP tools",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (the default)
    Chat(ChatArgs),

    /// Choose a provider, store its API key and write the config file
    Setup,

    /// List the tools advertised by the tool server
    Tools,
}

#[derive(Args, Default, Clone)]
struct ChatArgs {
    /// Provider to use (gemini or groq)
    #[arg(short, long)]
    provider: Option<ProviderKind>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Provider base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Model turns allowed per request
    #[arg(long)]
    max_turns: Option<u32>,

    /// Deny a permission prompt left unanswered this many seconds
    #[arg(long, value_name = "SECS")]
    prompt_timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let result = match cli.command {
        Some(Commands::Chat(args)) => interactive_chat(args).await,
        Some(Commands::Setup) => setup(),
        Some(Commands::Tools) => list_tools().await,
        None => interactive_chat(ChatArgs::default()).await,
    };

    if let Err(e) = result {
        eprintln!("\n{} {}: {}\n", style("❌").red(), style(e.label()).red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "clia=info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read KEY=VALUE pairs from a .env file, ignoring comments
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut env_vars = HashMap::new();

    if path.exists() {
        if path.is_dir() {
            return Err(Error::Config(format!(
                "{} is a directory, not a file",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)?;
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                env_vars.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    Ok(env_vars)
}

/// Append `key=value` to a .env file unless the key is already set there
fn append_env_var(path: &Path, key: &str, value: &str) -> Result<bool> {
    if read_env_file(path)?.contains_key(key) {
        return Ok(false);
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}={}", key, value)?;
    Ok(true)
}

/// Get the dialoguer theme
fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Prompt for sensitive input (hidden with asterisks)
fn prompt_secret(message: &str) -> Result<String> {
    let password = Password::with_theme(&theme())
        .with_prompt(message.trim())
        .allow_empty_password(true)
        .interact()
        .map_err(|e| Error::Config(format!("Password error: {}", e)))?;
    Ok(password)
}

/// Prompt with a default value shown
fn prompt_with_default(message: &str, default: &str) -> Result<String> {
    let input: String = Input::with_theme(&theme())
        .with_prompt(message.trim())
        .default(default.to_string())
        .interact_text()
        .map_err(|e| Error::Config(format!("Input error: {}", e)))?;
    Ok(input)
}

/// Display an interactive menu with arrow key navigation
fn prompt_menu(title: &str, options: &[&str], default: usize) -> Result<usize> {
    println!("\n{}", style(title).cyan().bold());
    println!("{}", style("  Use ↑/↓ arrows to navigate, Enter to select").dim());

    let selection = Select::with_theme(&theme())
        .items(options)
        .default(default)
        .interact()
        .map_err(|e| Error::Config(format!("Selection error: {}", e)))?;

    Ok(selection)
}

/// Print a section header
fn print_section(title: &str) {
    println!("\n{}", "─".repeat(50));
    println!("  {}", title);
    println!("{}", "─".repeat(50));
}

/// Print step indicator
fn print_step(step: usize, total: usize, title: &str) {
    println!("\n📍 Step {}/{}: {}", step, total, title);
}

fn env_var_for(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "GOOGLE_API_KEY",
        ProviderKind::Groq => "GROQ_API_KEY",
    }
}

// ============================================================================
// Terminal Input
// ============================================================================

/// Lines typed on stdin, read on a dedicated thread.
///
/// Both the chat prompt and the permission prompt take lines from here, so a
/// prompt abandoned by a cancelled request never swallows the next input.
struct InputLines {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl InputLines {
    fn spawn() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        Arc::new(InputLines {
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Next line, or `None` once stdin is closed
    async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// Asks on the terminal whether a tool call may run
struct TerminalPrompt {
    input: Arc<InputLines>,
}

#[async_trait]
impl PermissionPrompt for TerminalPrompt {
    async fn ask(&self, request: &PermissionRequest) -> Result<PermissionDecision> {
        println!();
        println!(
            "   {} {}",
            style("🔐 Permission required:").yellow().bold(),
            style(&request.tool).cyan().bold()
        );
        println!("   {}", style(&request.description).dim());
        if request.arguments.is_empty() {
            println!("   {}", style("(no arguments)").dim());
        }
        for (name, value) in request.arguments.iter() {
            println!("     {} = {}", style(name).yellow(), preview(&value.to_string(), 200));
        }
        println!(
            "   {}  {}  {}",
            style("[1] Allow once").green(),
            style("[2] Always allow").green(),
            style("[3] Deny").red()
        );

        loop {
            print!("   {} ", style("Choice ›").bold());
            io::stdout().flush()?;

            let Some(line) = self.input.next_line().await else {
                return Err(Error::InvalidInput("stdin closed during permission prompt".into()));
            };
            match PermissionDecision::from_choice(&line) {
                Some(decision) => return Ok(decision),
                None => println!("   {} Enter 1, 2 or 3.", style("⚠").yellow()),
            }
        }
    }
}

// ============================================================================
// Terminal Rendering
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum StreamState {
    #[default]
    Idle,
    Thinking,
    Answering,
}

/// Streams loop progress to the terminal
#[derive(Default)]
struct TerminalRenderer {
    state: Mutex<StreamState>,
}

impl TerminalRenderer {
    /// Switch stream state, returning the previous one
    fn enter(&self, next: StreamState) -> StreamState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *state, next)
    }

    /// Close any open streamed line
    fn finish_line(&self) {
        if self.enter(StreamState::Idle) != StreamState::Idle {
            println!();
        }
    }
}

#[async_trait]
impl LoopCallback for TerminalRenderer {
    async fn on_turn_start(&self, turn: u32, max_turns: u32) {
        self.finish_line();
        if turn > 1 {
            println!("   {}", style(format!("turn {}/{}", turn, max_turns)).dim());
        }
    }

    async fn on_text_delta(&self, text: &str) {
        if self.enter(StreamState::Answering) != StreamState::Answering {
            print!("\n   {}: ", style("Assistant").cyan().bold());
        }
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    async fn on_thought_delta(&self, text: &str) {
        if self.enter(StreamState::Thinking) != StreamState::Thinking {
            print!("\n   {} ", style("Thinking:").dim().italic());
        }
        print!("{}", style(text).dim());
        let _ = io::stdout().flush();
    }

    async fn on_tool_call(&self, call: &ToolCallRequest) {
        self.finish_line();
        println!(
            "\n   {} {}({})",
            style("🔧 Tool call:").yellow().bold(),
            style(&call.name).cyan(),
            preview(&call.arguments.to_string(), 160)
        );
    }

    async fn on_tool_result(&self, result: &ToolInvocationResult) {
        let label = if result.succeeded() {
            style("✓ Tool result:").green().bold()
        } else {
            style("✗ Tool failed:").red().bold()
        };
        println!("   {} {}", label, style(&result.name).cyan());
        for line in preview(&result.content, 600).lines() {
            println!("     {}", style(line).dim());
        }
    }

    async fn on_tool_denied(&self, call: &ToolCallRequest, reason: DenialReason) {
        let why = match reason {
            DenialReason::User => "denied by user",
            DenialReason::TimedOut => "no answer in time",
        };
        println!(
            "   {} {} ({})",
            style("⛔ Tool denied:").red().bold(),
            style(&call.name).cyan(),
            why
        );
    }

    async fn on_tool_error(&self, call: &ToolCallRequest, error: &Error) {
        self.finish_line();
        println!(
            "   {} {} [{}]: {}",
            style("⚠").yellow(),
            style(error.label()).yellow().bold(),
            call.name,
            error
        );
    }

    async fn on_reply_discarded(&self) {
        self.finish_line();
        println!("   {}", style("(partial reply above discarded)").dim().italic());
    }

    async fn on_rate_limited(&self, delay: Duration, attempt: u32) {
        self.finish_line();
        println!(
            "   {} retrying in {:?} (attempt {})",
            style("⏳ Rate Limited:").yellow().bold(),
            delay,
            attempt
        );
    }

    async fn on_loop_complete(&self, trace: &LoopTrace) {
        self.finish_line();
        debug!("Request finished after {} turn(s)", trace.turns_taken());
    }
}

/// First `max` characters of `text`, marked when cut
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

// ============================================================================
// Session Setup
// ============================================================================

/// Load config and apply command-line overrides for `kind`
fn chat_config(args: &ChatArgs) -> Result<(Config, ProviderKind)> {
    let mut config = load_config()?;
    let kind = args.provider.unwrap_or(config.provider.default);
    config.provider.default = kind;

    if let Some(ref model) = args.model {
        match kind {
            ProviderKind::Gemini => config.provider.gemini.model = model.clone(),
            ProviderKind::Groq => config.provider.groq.model = model.clone(),
        }
    }
    if let Some(ref url) = args.base_url {
        match kind {
            ProviderKind::Gemini => config.provider.gemini.base_url = url.clone(),
            ProviderKind::Groq => config.provider.groq.base_url = url.clone(),
        }
    }
    if let Some(max_turns) = args.max_turns {
        config.agent.max_turns = max_turns;
    }
    if let Some(secs) = args.prompt_timeout {
        config.permissions.prompt_timeout = Some(Duration::from_secs(secs));
    }

    let validation = validate_config(&config);
    for warning in &validation.warnings {
        println!("   {} {}: {}", style("⚠").yellow(), warning.path, warning.message);
    }
    if let Some(issue) = validation.errors.first() {
        let mut message = format!("{}: {}", issue.path, issue.message);
        if let Some(ref suggestion) = issue.suggestion {
            message.push_str(&format!(" ({})", suggestion));
        }
        return Err(Error::Config(message));
    }

    Ok((config, kind))
}

/// Spawn the configured tool server and discover its tools
async fn connect_tools(config: &Config) -> Result<(McpClient, ToolCatalog)> {
    let server = &config.tool_server;
    let client = McpClient::connect_stdio_with_args(&server.command, server.args.as_slice())
        .await
        .map_err(|e| Error::ToolDiscovery(e.to_string()))?;
    let catalog = ToolCatalog::discover(&client).await?;
    Ok((client, catalog))
}

// ============================================================================
// Interactive Chat
// ============================================================================

async fn interactive_chat(args: ChatArgs) -> Result<()> {
    let (config, kind) = chat_config(&args)?;

    let (client, catalog) = connect_tools(&config).await?;
    let provider = build_adapter(&config.provider, kind, &catalog)?;

    let input = InputLines::spawn();
    let record = PermissionRecord::load(&config.permissions.file);
    let mut gate = PermissionGate::new(
        record,
        Box::new(TerminalPrompt {
            input: Arc::clone(&input),
        }),
    )
    .with_timeout(config.permissions.prompt_timeout);

    let base_prompt = load_system_prompt(config.agent.system_prompt_file.as_deref())?;
    let system_prompt = build_system_prompt(&base_prompt, &catalog, &std::env::current_dir()?);
    let loop_config = LoopConfig::from_agent_config(&config.agent);
    let mut conversation = Conversation::new();

    println!();
    println!("{}", style("╔══════════════════════════════════════════════════╗").cyan());
    println!("{}", style("║              🤖 CLIA Interactive Chat            ║").cyan());
    println!("{}", style("╚══════════════════════════════════════════════════╝").cyan());
    println!();
    println!(
        "   {} Provider: {}  Model: {}",
        style("✓").green(),
        style(kind).cyan(),
        style(provider.model()).cyan()
    );
    println!(
        "   {} {} tools available, {} always allowed",
        style("✓").green(),
        catalog.len(),
        gate.record().tools().len()
    );
    println!(
        "   {} Session {} started {}",
        style("✓").green(),
        style(conversation.id).dim(),
        conversation.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
    );
    println!();
    println!("   {}", style("Commands:").dim());
    println!("   {}  - End the session", style("exit").yellow());
    println!("   {} - Cancel a running request", style("Ctrl-C").yellow());
    println!();

    info!(
        session = %conversation.id,
        "Chat session started with {} ({})",
        kind,
        provider.model()
    );

    let renderer = TerminalRenderer::default();

    loop {
        print!("{} ", style("You ›").green().bold());
        io::stdout().flush()?;

        let line = tokio::select! {
            line = input.next_line() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        if matches!(request.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = run_agentic_loop(AgentLoopInput {
            conversation: &mut conversation,
            user_input: request.to_string(),
            provider: provider.as_ref(),
            tools: &client,
            catalog: &catalog,
            gate: &mut gate,
            config: loop_config.clone(),
            system_prompt: &system_prompt,
            callback: &renderer,
            cancel,
        })
        .await;
        watcher.abort();
        renderer.finish_line();

        match result {
            Ok(output) => match output.outcome {
                LoopOutcome::Completed => println!(),
                LoopOutcome::BudgetExhausted => println!(
                    "\n   {} {}\n",
                    style("⚠ Turn Budget Exhausted:").yellow().bold(),
                    output.response
                ),
                LoopOutcome::EmptyResponse => println!(
                    "\n   {} The model returned no answer.\n",
                    style("⚠ Empty Response:").yellow().bold()
                ),
            },
            Err(Error::Cancelled) => println!(
                "\n   {} Request interrupted; the conversation keeps only completed turns.\n",
                style("⏹ Cancelled:").yellow().bold()
            ),
            Err(e) => println!(
                "\n   {} {}: {}\n",
                style("❌").red(),
                style(e.label()).red().bold(),
                e
            ),
        }
    }

    info!(
        session = %conversation.id,
        turns = conversation.len(),
        "Chat session ended after {}s",
        conversation.active_duration().num_seconds()
    );
    println!("\n{} Goodbye!\n", style("👋").bold());
    Ok(())
}

// ============================================================================
// Tool Listing
// ============================================================================

async fn list_tools() -> Result<()> {
    let config = load_config()?;
    let (client, catalog) = connect_tools(&config).await?;

    print_section(&format!("🧰 Tools served by {}", client.name()));
    for tool in catalog.list() {
        println!("\n   {}", style(&tool.name).cyan().bold());
        println!("   {}", style(&tool.description).dim());
        for param in &tool.params {
            let marker = if param.required { "*" } else { " " };
            println!(
                "     {}{} ({}): {}",
                style(&param.name).yellow(),
                marker,
                param.param_type.as_schema_str(),
                param.description
            );
        }
    }
    println!();
    Ok(())
}

// ============================================================================
// Setup
// ============================================================================

fn setup() -> Result<()> {
    println!();
    println!("{}", style("╔══════════════════════════════════════════════════╗").cyan());
    println!("{}", style("║                 🛠  CLIA Setup                    ║").cyan());
    println!("{}", style("╚══════════════════════════════════════════════════╝").cyan());

    let mut config = load_config()?;
    let total = 3;

    print_step(1, total, "Provider");
    let providers = [ProviderKind::Groq, ProviderKind::Gemini];
    let labels = ["Groq (OpenAI-compatible)", "Google Gemini"];
    let current = providers
        .iter()
        .position(|p| *p == config.provider.default)
        .unwrap_or(0);
    let kind = providers[prompt_menu("Which provider should CLIA use?", &labels, current)?];
    config.provider.default = kind;

    print_step(2, total, "Model and API key");
    let model = match kind {
        ProviderKind::Gemini => &mut config.provider.gemini.model,
        ProviderKind::Groq => &mut config.provider.groq.model,
    };
    *model = prompt_with_default("Model", model)?;

    let env_path = Path::new(".env");
    let var = env_var_for(kind);
    if config.provider.has_api_key(kind) {
        println!("   {} {} is already set", style("✓").green(), var);
    } else {
        let key = prompt_secret(&format!("{} (leave empty to skip)", var))?;
        if key.trim().is_empty() {
            println!("   {} Skipped; set {} before chatting", style("⚠").yellow(), var);
        } else if append_env_var(env_path, var, key.trim())? {
            println!("   {} Saved {} to {}", style("✓").green(), var, env_path.display());
        }
    }

    print_step(3, total, "Agent limits");
    let turns = prompt_with_default("Max model turns per request", &config.agent.max_turns.to_string())?;
    match turns.trim().parse::<u32>() {
        Ok(n) if n > 0 => config.agent.max_turns = n,
        _ => println!(
            "   {} Keeping {} turns",
            style("⚠").yellow(),
            config.agent.max_turns
        ),
    }

    let path = config_path();
    save_config(&config, &path)?;

    print_section("✅ Setup complete");
    println!("   Config written to {}", style(path.display()).cyan());
    println!("   Run {} to start chatting.", style("clia").yellow());
    println!();
    Ok(())
}
