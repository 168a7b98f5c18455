//! `toolcall`: connect to an MCP server, run the handshake and issue one command.
//!
//! Results go to stdout, logs to stderr.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tokio::process::Command;
use toolcall_client::{Client, ClientConfig, Transport};
use toolcall_http::{SseClientConfig, SseTransport};
use toolcall_stdio::StdioTransport;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Commands, Connection};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let transport = connect(&cli.conn)?;
    let config = ClientConfig {
        timeouts: cli.conn.timeouts(),
        ..ClientConfig::new("toolcall", env!("CARGO_PKG_VERSION"))
    };
    let client = Client::new(transport, config);

    let outcome = tokio::select! {
        outcome = execute(&client, cli.action) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            Ok(())
        }
    };

    let metrics = client.transport().metrics();
    info!(
        sent = metrics.messages_sent,
        received = metrics.messages_received,
        reconnects = metrics.reconnects,
        "session finished"
    );
    if let Err(e) = client.shutdown().await {
        warn!("shutdown failed: {}", e);
    }
    outcome
}

fn connect(conn: &Connection) -> Result<Arc<dyn Transport>> {
    if let Some(command) = &conn.command {
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            bail!("--command is empty");
        };
        let mut cmd = Command::new(program);
        cmd.args(parts);
        info!(program, "spawning stdio server");
        let transport = StdioTransport::from_command(cmd).with_limits(conn.limits());
        return Ok(Arc::new(transport));
    }

    let mut config = SseClientConfig::new(conn.url.clone());
    config.auth_token = conn.auth.clone();
    config.timeouts = conn.timeouts();
    config.tls = conn.tls();
    config.limits = conn.limits();
    let transport = SseTransport::new(config)
        .with_context(|| format!("invalid server URL {}", conn.url))?;
    info!(url = %conn.url, "connecting over SSE");
    Ok(Arc::new(transport))
}

async fn execute(client: &Client, command: Commands) -> Result<()> {
    let server = client.initialize().await.context("handshake failed")?;

    match command {
        Commands::Info => {
            println!("{} {}", server.server_info.name, server.server_info.version);
            println!("protocol: {}", server.protocol_version);
            for capability in &server.capabilities {
                println!(
                    "capability: {} (subscribe: {}, listChanged: {})",
                    capability.name, capability.subscribe, capability.list_changed
                );
            }
            if let Some(instructions) = &server.instructions {
                println!("\n{}", instructions);
            }
        }
        Commands::Ping => {
            client.ping().await?;
            println!("pong");
        }
        Commands::Tools => {
            let tools = client.list_tools().await?;
            if tools.is_empty() {
                println!("No tools available");
            }
            for tool in tools {
                println!(
                    "{} - {}",
                    tool.name,
                    tool.description.as_deref().unwrap_or("No description")
                );
            }
        }
        Commands::Call { name, arguments } => {
            let arguments: Value =
                serde_json::from_str(&arguments).context("--arguments must be JSON")?;
            if !arguments.is_object() {
                bail!("--arguments must be a JSON object");
            }
            let result = client.call_tool(&name, Some(arguments)).await?;
            for block in &result.content {
                match block.get("text").and_then(Value::as_str) {
                    Some(text) => println!("{}", text),
                    None => println!("{}", serde_json::to_string_pretty(block)?),
                }
            }
            if result.is_error() {
                bail!("tool `{}` reported an error", name);
            }
        }
    }
    Ok(())
}
