//! # coder1-cli
//!
//! `coder1-stream` binary: stream a prompt, watch sessions or ping the
//! server over the Coder1 WebSocket endpoints.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use coder1_client::{ClientEvent, StreamClient, StreamOptions};
use coder1_core::logging::{LogFormat, init_subscriber};
use coder1_settings::Coder1Settings;
use tokio::sync::broadcast::error::RecvError;

/// Coder1 streaming client.
#[derive(Parser, Debug)]
#[command(name = "coder1-stream", about = "Coder1 streaming WebSocket client")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Settings file (defaults to `~/.coder1/stream.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Explicit WebSocket URL, bypassing endpoint derivation.
    #[arg(long, global = true)]
    url: Option<String>,

    /// HTTP(S) origin the WebSocket URL is derived from.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log level filter (overridden by `RUST_LOG`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a response to a prompt and print it as it arrives.
    Stream(StreamArgs),
    /// Subscribe to sessions and print their status and output as JSON lines.
    Watch {
        /// Session ids to subscribe to.
        #[arg(required = true)]
        sessions: Vec<String>,
    },
    /// Send a ping and wait for the pong.
    Ping {
        /// Seconds to wait for the pong.
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Prompt text.
    prompt: String,

    /// Model override.
    #[arg(long)]
    model: Option<String>,

    /// Token limit override.
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Temperature override.
    #[arg(long)]
    temperature: Option<f64>,

    /// System prompt.
    #[arg(long)]
    system: Option<String>,

    /// Seconds to wait for the stream to finish.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

/// Load settings and layer command-line overrides on top.
fn resolve_settings(global: &GlobalArgs) -> Result<Coder1Settings> {
    let path = global
        .settings
        .clone()
        .unwrap_or_else(coder1_settings::settings_path);
    let mut settings = coder1_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(url) = &global.url {
        settings.connection.url = Some(url.clone());
    }
    if let Some(base_url) = &global.base_url {
        settings.connection.base_url.clone_from(base_url);
    }
    if let Some(level) = &global.log_level {
        settings.logging.level.clone_from(level);
    }
    if global.json_logs {
        settings.logging.format = LogFormat::Json;
    }
    Ok(settings)
}

fn stream_options(args: &StreamArgs) -> StreamOptions {
    let mut options = StreamOptions::new().on_chunk(|chunk| {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.chunk.as_bytes());
        let _ = stdout.flush();
    });
    if let Some(model) = &args.model {
        options = options.model(model.clone());
    }
    if let Some(max_tokens) = args.max_tokens {
        options = options.max_tokens(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        options = options.temperature(temperature);
    }
    if let Some(system) = &args.system {
        options = options.system_prompt(system.clone());
    }
    options
}

async fn run_stream(settings: &Coder1Settings, args: StreamArgs) -> Result<()> {
    let client = StreamClient::streaming(settings)?;
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", client.url()))?;

    let options = stream_options(&args);
    let done = tokio::time::timeout(
        Duration::from_secs(args.timeout_secs),
        client.collect_stream(args.prompt, options),
    )
    .await
    .map_err(|_| anyhow!("stream did not finish within {}s", args.timeout_secs))??;

    println!();
    tracing::info!(
        stream_id = %done.stream_id,
        duration_ms = done.duration_ms,
        chars = done.content.len(),
        "stream complete"
    );
    client.disconnect().await?;
    Ok(())
}

async fn run_watch(settings: &Coder1Settings, sessions: Vec<String>) -> Result<()> {
    let client = StreamClient::infinite_loop(settings)?;
    for session in sessions {
        client.subscribe(session)?;
    }
    let mut events = client.events();
    let mut state = client.state_changes();
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", client.url()))?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event @ (ClientEvent::Status { .. } | ClientEvent::Output { .. })) => {
                    println!("{}", serde_json::to_string(&event)?);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event consumer lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            failed = state.wait_for(|s| s.is_terminal()) => {
                if failed.is_ok() {
                    bail!("connection lost and reconnect attempts exhausted");
                }
                break;
            }
            result = &mut shutdown => {
                result.context("Failed to listen for ctrl-c")?;
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

async fn run_ping(settings: &Coder1Settings, timeout_secs: u64) -> Result<()> {
    let client = StreamClient::streaming(settings)?;
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", client.url()))?;

    let mut events = client.events();
    let started = Instant::now();
    client.ping()?;

    let wait = async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::Pong) => return Ok(()),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(anyhow!("client closed before pong")),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(timeout_secs), wait)
        .await
        .map_err(|_| anyhow!("no pong within {timeout_secs}s"))??;

    println!("pong from {} in {}ms", client.url(), started.elapsed().as_millis());
    client.disconnect().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli.global)?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    match cli.command {
        Command::Stream(args) => run_stream(&settings, args).await,
        Command::Watch { sessions } => run_watch(&settings, sessions).await,
        Command::Ping { timeout_secs } => run_ping(&settings, timeout_secs).await,
    }
}
