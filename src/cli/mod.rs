//! CLI commands for InputBridge using clap.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{apply_env_overrides, load_settings, load_settings_from, validate_settings, Settings};
use crate::control::{interrupt_signal, ProcessControl, ShutdownReason};
use crate::protocol::McpServer;
use crate::web::{self, AppState};

/// How long the web server gets to finish in-flight responses on shutdown.
const WEB_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// InputBridge - hand messages typed in a browser to a waiting agent.
#[derive(Parser)]
#[command(name = "inputbridge")]
#[command(version)]
#[command(about = "InputBridge - a web input panel feeding a blocking MCP tool", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.inputbridge/settings.json)
    #[arg(long, global = true, env = "INPUTBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the web UI and the MCP stdio server (default)
    Serve(ServeArgs),

    /// Print an MCP client configuration entry that launches this binary
    McpConfig {
        /// Server name to register under
        #[arg(long, default_value = "inputbridge")]
        name: String,

        /// Let the client call the input tool without confirmation
        #[arg(long)]
        auto_approve: bool,
    },

    /// Print the effective settings
    Config,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Host for the web UI
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the web UI
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum pending messages (unbounded when omitted)
    #[arg(long)]
    pub capacity: Option<usize>,
}

impl ServeArgs {
    /// Apply flags on top of file and environment settings.
    pub fn apply(&self, mut settings: Settings) -> Result<Settings> {
        if let Some(host) = &self.host {
            settings.web.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.web.port = port;
        }
        if let Some(capacity) = self.capacity {
            settings.queue.capacity = Some(capacity);
        }
        validate_settings(&settings)?;
        Ok(settings)
    }
}

impl Commands {
    pub async fn run(self) -> Result<()> {
        let Commands { config, command } = self;
        let settings = resolve_settings(config)?;

        match command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
            Command::Serve(args) => serve(args.apply(settings)?).await,
            Command::McpConfig { name, auto_approve } => {
                let exe = std::env::current_exe()?;
                let snippet = mcp_client_config(
                    &exe.to_string_lossy(),
                    &name,
                    &settings.agent.tool_name,
                    auto_approve,
                );
                println!("{}", serde_json::to_string_pretty(&snippet)?);
                Ok(())
            }
            Command::Config => {
                println!("{}", serde_json::to_string_pretty(&settings)?);
                Ok(())
            }
        }
    }
}

fn resolve_settings(config: Option<PathBuf>) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => load_settings_from(&path)?,
        None => load_settings()?,
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Run the bridge until killed, interrupted, or the agent disconnects.
pub async fn serve(settings: Settings) -> Result<()> {
    let queue = settings.queue.build_queue();
    let control = ProcessControl::from_settings(&settings.control);

    let listener = web::bind(&settings.web).await?;
    tracing::info!("Open {} to talk to the agent", settings.web.url());

    let web_task = tokio::spawn(web::run_web_server(
        listener,
        AppState::new(queue.clone(), control.clone()),
    ));

    let agent = McpServer::with_input_tool(&settings.agent, queue.clone());
    let agent_control = control.clone();
    let agent_task = tokio::spawn(async move {
        if let Err(e) = agent.serve(tokio::io::stdin(), tokio::io::stdout()).await {
            tracing::error!("Agent protocol failed: {}", e);
        }
        agent_control.shutdown(ShutdownReason::AgentDisconnected);
    });

    let reason = tokio::select! {
        reason = control.wait() => reason,
        _ = interrupt_signal() => {
            control.shutdown(ShutdownReason::Interrupt);
            ShutdownReason::Interrupt
        }
    };

    let stats = queue.stats();
    queue.close();
    tracing::info!(
        pending = stats.pending,
        waiters = stats.waiters,
        "Shutting down: {}",
        reason
    );

    agent_task.abort();
    match tokio::time::timeout(WEB_SHUTDOWN_GRACE, web_task).await {
        Ok(Ok(Err(e))) => tracing::warn!("Web server stopped with error: {}", e),
        Ok(Err(e)) => tracing::warn!("Web server task failed: {}", e),
        Err(_) => tracing::debug!("Web server did not stop within grace period"),
        Ok(Ok(Ok(()))) => {}
    }

    Ok(())
}

/// Build an `mcpServers` entry that launches `command serve`.
pub fn mcp_client_config(command: &str, name: &str, tool_name: &str, auto_approve: bool) -> Value {
    let mut entry = json!({
        "command": command,
        "args": ["serve"],
    });
    if auto_approve {
        entry["autoApprove"] = json!([tool_name]);
    }

    let mut servers = Map::new();
    servers.insert(name.to_string(), entry);
    json!({ "mcpServers": servers })
}
