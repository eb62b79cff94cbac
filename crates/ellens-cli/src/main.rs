//! Ellens CLI
//!
//! Terminal client for the Young Ellens chat server. Connects over
//! WebSocket, joins a conversation, and turns stdin lines into chat
//! messages while rendering everything the server pushes back.

use clap::Parser;
use ellens_session::transport::WebSocketTransport;
use ellens_session::{ChatSession, ConnectConfig, ConversationId, HealthStatus};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod events;

use events::TerminalEvents;

/// Chat with Young Ellens from your terminal
///
/// Plain lines are sent as messages. Commands: /react <message-id>
/// <emoji>, /retry, /quit.
#[derive(Parser, Debug)]
#[command(name = "ellens")]
#[command(version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the chat server
    #[arg(short, long, env = "ELLENS_URL", default_value = "ws://localhost:8000/ws")]
    url: String,

    /// Health endpoint URL; skipped when absent
    #[arg(long, env = "ELLENS_HEALTH_URL")]
    health_url: Option<String>,

    /// Conversation id to join (generated when absent)
    #[arg(short, long)]
    conversation: Option<String>,

    /// Display name for the conversation
    #[arg(short, long)]
    name: Option<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let json_output = matches!(args.format, OutputFormat::Json);

    if let Some(health_url) = &args.health_url {
        let status = fetch_health(health_url).await;
        if json_output {
            println!("{}", serde_json::to_string(&status).unwrap_or_default());
        } else {
            println!("{}", status.summary());
        }
    }

    let conversation = match (args.conversation, args.name) {
        (Some(id), Some(name)) => ConversationId::from_parts(id, name),
        (Some(id), None) => ConversationId::from_parts(id.clone(), id),
        (None, Some(name)) => ConversationId::with_name(name),
        (None, None) => ConversationId::new(),
    };

    let session = ChatSession::new(
        Arc::new(WebSocketTransport),
        ConnectConfig::new(&args.url),
        Arc::new(TerminalEvents::new(json_output)),
    );

    // Failures are rendered by the event handler's on_error
    if session.start().await.is_err() {
        return ExitCode::FAILURE;
    }

    if let Err(e) = session.join_conversation(&conversation.id).await {
        eprintln!("Error: {e}");
        session.stop().await;
        return ExitCode::FAILURE;
    }
    if !json_output {
        println!("-- joined conversation: {conversation}");
    }

    let result = run_input_loop(&session, json_output).await;
    session.stop().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Stdin line loop; returns on /quit, EOF, or Ctrl-C
async fn run_input_loop(session: &ChatSession, json_output: bool) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !handle_line(session, line, json_output).await {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

/// Returns false when the loop should end
async fn handle_line(session: &ChatSession, line: &str, json_output: bool) -> bool {
    if let Some(rest) = line.strip_prefix("/react ") {
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(message_id), Some(emoji)) => {
                match session.react(message_id, emoji).await {
                    Ok(count) if !json_output => {
                        println!("-- {emoji} x{count} on {message_id}");
                    }
                    Ok(_) => {}
                    Err(e) => eprintln!("-- reaction failed: {e}"),
                }
            }
            _ => eprintln!("usage: /react <message-id> <emoji>"),
        }
        return true;
    }

    match line {
        "/quit" => false,
        "/retry" => {
            if let Err(e) = session.retry_connection().await {
                eprintln!("-- retry failed: {e}");
            }
            true
        }
        _ => {
            match session.send_message(line).await {
                Ok(message) => {
                    if !json_output {
                        println!("-- sent ({})", message.id);
                    }
                }
                Err(e) => eprintln!("-- send failed: {e}"),
            }
            true
        }
    }
}

/// Best-effort health fetch; any failure degrades to unknown
async fn fetch_health(url: &str) -> HealthStatus {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("health client build failed: {}", e);
            return HealthStatus::unknown();
        }
    };

    match client.get(url).send().await {
        Ok(response) => match response.json::<HealthStatus>().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("health payload decode failed: {}", e);
                HealthStatus::unknown()
            }
        },
        Err(e) => {
            tracing::warn!("health fetch failed: {}", e);
            HealthStatus::unknown()
        }
    }
}
