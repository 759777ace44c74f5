//! Thin CLI entry point (spec §6): load a swarm configuration, run one
//! prompt through it, and print the result as `human` or `json`.
//!
//! Grounded in `stippi-code-assistant::cli`'s `clap` derive layout,
//! narrowed to the single config-path + prompt surface spec §6 describes.

use clap::{Parser, ValueEnum};
use std::io::{BufRead, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use swarm::cloudllm::clients::openai::OpenAIClient;
use swarm::{
    builtin_factory_registry, ClientWrapperProvider, ConfigurationError, Event, ExecutionResult, LlmProvider,
    LlmProviderFactory, Swarm, SwarmConfig, SwarmError, SwarmResult,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Output format selector.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    /// Multi-line, human-readable summary.
    Human,
    /// A single-line JSON object.
    Json,
}

/// Run a swarm of cooperating LLM agents against one prompt.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a swarm configuration TOML file.
    #[arg(long)]
    config: PathBuf,

    /// Prompt text. If omitted, read from stdin (or an interactive
    /// readline loop with `--interactive`).
    #[arg(long)]
    prompt: Option<String>,

    /// Read prompts interactively from stdin, one execution per line,
    /// until EOF.
    #[arg(long)]
    interactive: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// OpenAI-compatible API key environment variable name.
    #[arg(long, default_value = "OPEN_AI_SECRET")]
    api_key_env: String,
}

/// Resolves every agent's model to an [`OpenAIClient`]-backed provider
/// using a single API key read once from the environment.
struct EnvOpenAiFactory {
    api_key: String,
}

impl LlmProviderFactory for EnvOpenAiFactory {
    fn provider_for(&self, model: &str) -> SwarmResult<Arc<dyn LlmProvider>> {
        let client = OpenAIClient::new_with_model_string(&self.api_key, model);
        Ok(Arc::new(ClientWrapperProvider::new(model, Arc::new(client))))
    }
}

fn print_human(result: &ExecutionResult) {
    println!("{}", result.content);
    eprintln!(
        "\n-- {} in {:?} ({} llm requests, {} tool calls, {} tokens, agents: {})",
        if result.success { "ok" } else { "failed" },
        result.duration,
        result.llm_requests,
        result.tool_calls_count,
        result.tokens_used,
        result.agents_involved.join(", "),
    );
    if let Some(error) = &result.error {
        eprintln!("-- error: {error}");
    }
}

fn print_json(result: &ExecutionResult) {
    let payload = serde_json::json!({
        "content": result.content,
        "success": result.success,
        "duration_ms": result.duration.as_millis(),
        "tokens_used": result.tokens_used,
        "llm_requests": result.llm_requests,
        "tool_calls_count": result.tool_calls_count,
        "agents_involved": result.agents_involved,
        "error": result.error,
    });
    println!("{payload}");
}

fn read_stdin_prompt() -> std::io::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim().to_string())
}

async fn run_once(instance: &Swarm, prompt: String, format: OutputFormat, cancellation: CancellationToken) -> bool {
    let format_for_log = format;
    let log_callback = Arc::new(move |event: &Event| {
        if format_for_log == OutputFormat::Human {
            tracing::debug!(event_type = event.event_type(), agent = %event.agent, "event");
        }
    });
    let result = instance.execute(prompt, log_callback, cancellation).await;
    match format {
        OutputFormat::Human => print_human(&result),
        OutputFormat::Json => print_json(&result),
    }
    result.success
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match SwarmConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let api_key = match std::env::var(&args.api_key_env) {
        Ok(key) => key,
        Err(_) => {
            eprintln!("missing environment variable `{}`", args.api_key_env);
            return std::process::ExitCode::FAILURE;
        }
    };

    let tool_factories = builtin_factory_registry();
    let llm_factory: Arc<dyn LlmProviderFactory> = Arc::new(EnvOpenAiFactory { api_key });

    let swarm_instance = match Swarm::from_config(config, tool_factories, llm_factory) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("swarm build error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let cancellation = CancellationToken::new();
    let cancel_on_ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_ctrl_c.cancel();
        }
    });

    if args.interactive {
        let stdin = std::io::stdin();
        loop {
            if !std::io::stdout().is_terminal() {
                eprint!("> ");
                let _ = std::io::stderr().flush();
            }
            let mut line = String::new();
            let bytes_read = match stdin.lock().read_line(&mut line) {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("stdin error: {e}");
                    return std::process::ExitCode::FAILURE;
                }
            };
            if bytes_read == 0 {
                break;
            }
            let prompt = line.trim().to_string();
            if prompt.is_empty() {
                continue;
            }
            if cancellation.is_cancelled() {
                return std::process::ExitCode::from(130);
            }
            run_once(&swarm_instance, prompt, args.format, cancellation.clone()).await;
        }
        return std::process::ExitCode::SUCCESS;
    }

    let prompt = match args.prompt {
        Some(p) => p,
        None => match read_stdin_prompt() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("stdin error: {e}");
                return std::process::ExitCode::FAILURE;
            }
        },
    };
    if prompt.is_empty() {
        eprintln!("configuration error: {}", SwarmError::Configuration(ConfigurationError::Invalid("empty prompt".to_string())));
        return std::process::ExitCode::FAILURE;
    }

    let success = run_once(&swarm_instance, prompt, args.format, cancellation.clone()).await;
    if cancellation.is_cancelled() {
        std::process::ExitCode::from(130)
    } else if success {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::FAILURE
    }
}
