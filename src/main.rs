//! `mcp-config`: inspect, normalize and watch MCP server configuration files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use mcp_config::config::schema::SERVERS_KEY;
use mcp_config::observability::logging::{self, LogFormat};
use mcp_config::ConfigManager;

#[derive(Parser)]
#[command(name = "mcp-config")]
#[command(about = "Validate, normalize and watch MCP server configuration", long_about = None)]
struct Cli {
    /// Log filter used when MCP_CONFIG_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Check { path: PathBuf },
    /// Print the normalized configuration, or one server, as JSON
    Show { path: PathBuf, server: Option<String> },
    /// Write the normalized configuration back, keeping comments
    Fmt {
        path: PathBuf,
        /// Write here instead of over the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Keep the configuration loaded and report every reload until Ctrl-C
    Watch { path: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    logging::init(&cli.log_level, format);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check { path } => {
            let manager = ConfigManager::new(path.clone())?;
            let config = manager
                .load()
                .with_context(|| format!("{} is not a valid configuration", path.display()))?;
            println!("{}: {} server(s) OK", path.display(), config.len());
        }
        Commands::Show { path, server } => {
            let manager = ConfigManager::new(path)?;
            let config = manager.load()?;
            let servers = &config.document().value()[SERVERS_KEY];
            let value: &Value = match server.as_deref() {
                Some(name) => servers
                    .get(name)
                    .with_context(|| format!("no server named '{name}'"))?,
                None => servers,
            };
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Commands::Fmt { path, output } => {
            let manager = ConfigManager::new(path)?;
            let config = manager.load()?;
            let written = manager.save_config(config.document(), output.as_deref())?;
            println!("wrote {}", written.display());
        }
        Commands::Watch { path } => watch(path).await?,
    }
    Ok(())
}

async fn watch(path: PathBuf) -> Result<()> {
    let manager = ConfigManager::new(path)?;
    // No fallback exists for a bad initial load.
    let config = manager.load().context("initial configuration load failed")?;
    tracing::info!(servers = config.len(), "Watching configuration, Ctrl-C to stop");

    let mut changes = manager.subscribe();
    manager.watch()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let names: Vec<String> = changes
                    .borrow_and_update()
                    .as_ref()
                    .map(|config| config.servers().keys().cloned().collect())
                    .unwrap_or_default();
                tracing::info!(servers = ?names, "Configuration reloaded");
            }
        }
    }

    manager.stop_watching();
    tracing::info!("Shutdown complete");
    Ok(())
}
