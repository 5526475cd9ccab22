//! Send a chat-completion request to the io Intelligence API and print the
//! response.
//!
//! Reads the API key from the `IO_API_KEY` environment variable and the
//! endpoint URL from `IO_API_URL`.
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! iointel --user "Summarize the plot of Hamlet in two sentences"
//!
//! # With system prompt and model selection
//! iointel --system "You are a terse assistant." \
//!   --user "Explain exponential backoff." \
//!   --model meta-llama/Llama-3.1-70B-Instruct
//!
//! # Pipe content from stdin
//! cat draft.md | iointel --system "Proofread this." --stdin
//!
//! # Stream deltas as they arrive
//! iointel --user "Write a haiku about retries" --stream
//!
//! # List available models
//! iointel --list-models
//! ```

use clap::Parser;
use iointel_rs::prelude::*;
use std::io::{self, Read, Write};
use std::process;
use std::time::Duration;

/// Send a chat-completion request to the io Intelligence API and print the
/// response.
///
/// Reads the API key from the IO_API_KEY environment variable and the
/// endpoint URL from IO_API_URL.
#[derive(Parser)]
#[command(name = "iointel")]
struct Cli {
    // ── Message content ────────────────────────────────────────
    /// System prompt to set the assistant's behavior
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    // ── Model and sampling ─────────────────────────────────────
    /// Model to use
    #[arg(long, default_value = iointel_rs::DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature (0.0 = deterministic)
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Maximum tokens in the response
    #[arg(long, default_value_t = 1000)]
    max_tokens: u32,

    /// Stop sequence(s)
    #[arg(long)]
    stop: Vec<String>,

    // ── Transport ──────────────────────────────────────────────
    /// Per-attempt request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Maximum retry attempts for transient errors
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    // ── Output mode ────────────────────────────────────────────
    /// Stream the response, printing deltas as they arrive
    #[arg(long)]
    stream: bool,

    /// Print the full API JSON response
    #[arg(long)]
    raw: bool,

    /// List available models and exit
    #[arg(long)]
    list_models: bool,
}

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn build_client(cli: &Cli) -> Result<IoClient, String> {
    let api_key = std::env::var("IO_API_KEY").map_err(|_| "IO_API_KEY not set".to_string())?;
    let api_url = std::env::var("IO_API_URL").map_err(|_| "IO_API_URL not set".to_string())?;

    IoClient::with_config(
        api_key,
        api_url,
        Duration::from_secs(cli.timeout),
        RetryPolicy::with_retries(cli.max_retries),
    )
    .map_err(|e| e.to_string())
}

/// Build a ChatRequest from CLI flags.
fn build_request(cli: &Cli) -> Result<ChatRequest, String> {
    let mut messages = Vec::new();
    if let Some(ref system) = cli.system {
        messages.push(Message::system(system));
    }

    let user_content = if cli.stdin {
        let stdin_content = read_stdin_content()?;
        match cli.user {
            Some(ref user) => format!("{user}\n\n{stdin_content}"),
            None => stdin_content,
        }
    } else {
        cli.user
            .clone()
            .ok_or_else(|| "provide --user or --stdin".to_string())?
    };
    messages.push(Message::user(user_content));

    Ok(ChatRequest {
        model: Some(cli.model.clone()),
        messages,
        max_tokens: cli.max_tokens,
        temperature: cli.temperature,
        stop: (!cli.stop.is_empty()).then(|| cli.stop.clone()),
        ..Default::default()
    })
}

async fn run(cli: &Cli) -> Result<String, String> {
    let client = build_client(cli)?;

    if cli.list_models {
        let models = client.list_models().await.map_err(|e| e.to_string())?;
        let ids: Vec<&str> = models
            .iter()
            .filter_map(|m| m.get("id").and_then(serde_json::Value::as_str))
            .collect();
        return Ok(format!("{}\n", ids.join("\n")));
    }

    let req = build_request(cli)?;

    if cli.stream {
        let chunks = client
            .chat_stream_live(&req, |chunk| {
                print!("{}", chunk.content);
                io::stdout().flush().ok();
            })
            .await
            .map_err(|e| e.to_string())?;
        let ends_with_newline = collect_text(&chunks).ends_with('\n');
        return Ok(if ends_with_newline {
            String::new()
        } else {
            "\n".to_string()
        });
    }

    if cli.raw {
        let value = client.execute(&req).await.map_err(|e| e.to_string())?;
        let pretty = serde_json::to_string_pretty(&value)
            .map_err(|e| format!("failed to render response: {e}"))?;
        return Ok(format!("{pretty}\n"));
    }

    let completion = client.chat(&req).await.map_err(|e| e.to_string())?;
    Ok(completion.content)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
