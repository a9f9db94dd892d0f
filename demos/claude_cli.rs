//! Sends stdin as one user turn and prints the reply.
//!
//! ```text
//! echo "Why is the sky blue?" | cargo run --example claude_cli -- --stream
//! ```

use std::io::{self, Read, Write};

use clap::{Parser, ValueEnum};
use claude_wire::config::{BackendConfig, build_client_from_configs};
use claude_wire::http::reqwest::default_dyn_transport;
use claude_wire::models::CLAUDE_3_5_SONNET;
use claude_wire::types::{MessageRequest, Turn};
use claude_wire::{CancellationToken, MessageContent};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Anthropic,
    Bedrock,
    Vertex,
}

#[derive(Debug, Parser)]
#[command(about = "Chat with Claude from the command line")]
struct Args {
    /// Backend to use; credentials are read from the environment.
    #[arg(long, value_enum, default_value = "anthropic")]
    backend: Backend,
    #[arg(long, default_value = CLAUDE_3_5_SONNET)]
    model: String,
    #[arg(long)]
    system: Option<String>,
    /// Print text as it arrives.
    #[arg(long)]
    stream: bool,
    /// Log every frame received.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("claude_wire=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match args.backend {
        Backend::Anthropic => BackendConfig::anthropic_from_env("cli")?,
        Backend::Bedrock => BackendConfig::bedrock_from_env("cli")?,
        Backend::Vertex => BackendConfig::vertex_from_env("cli")?,
    };
    let client = build_client_from_configs(&[config], default_dyn_transport()?)?;

    let mut prompt = String::new();
    io::stdin().read_to_string(&mut prompt)?;

    let mut request = MessageRequest::new(args.model, vec![Turn::user_text(prompt.trim())]);
    request.system = args.system;
    request.stream = args.stream;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut response = client.message("cli", request, cancel).await?;
    let mut stdout = io::stdout();
    while let Some(event) = response.next_event().await {
        match &event.payload {
            MessageContent::ClaudeError(err) => {
                eprintln!("\napi error: {err}");
                break;
            }
            MessageContent::ClientError(err) => {
                eprintln!("\nstream error: {err}");
                break;
            }
            MessageContent::MessageDelta(delta) => {
                tracing::debug!(stop_reason = ?delta.delta.stop_reason, "message delta");
            }
            payload => {
                write!(stdout, "{}", payload.text())?;
                stdout.flush()?;
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}
