use std::path::PathBuf;

use anyhow::{Context, Result};
use atty::Stream;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::signal;
use tracing::{info, warn};
use uidocs_mcp_server::logging::init_logging;
use uidocs_mcp_server::{mirror_from_config, Application, ServerConfig};
use uidocs_mcp_tools::DocsTool;

#[derive(Parser)]
#[command(
    name = "uidocs",
    version,
    author,
    about = "UI component documentation over the Model Context Protocol",
    long_about = "uidocs mirrors a component library's documentation and serves it to MCP clients over streamable HTTP, one session per client."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Configuration file path (TOML)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the MCP HTTP server")]
    Serve {
        #[arg(long, help = "Address to bind")]
        host: Option<String>,

        #[arg(short, long, help = "Port to listen on")]
        port: Option<u16>,

        #[arg(long, help = "Serve an existing docs directory instead of the git mirror")]
        docs_dir: Option<PathBuf>,

        #[arg(long, help = "Evict sessions idle for longer than this many seconds")]
        session_timeout_secs: Option<u64>,
    },

    #[command(about = "Sync the documentation mirror and exit")]
    Sync,

    #[command(about = "Show documentation mirror status")]
    Status {
        #[arg(long, help = "Print machine-readable JSON")]
        json: bool,
    },

    #[command(about = "List the tools exposed to MCP clients")]
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Commands::Serve {
        host,
        port,
        docs_dir,
        session_timeout_secs,
    } = &cli.command
    {
        if let Some(host) = host {
            config.http.host = host.clone();
        }
        if let Some(port) = port {
            config.http.port = *port;
        }
        if let Some(dir) = docs_dir {
            config.mirror.local_path = Some(dir.clone());
        }
        if let Some(secs) = session_timeout_secs {
            config.session.timeout_secs = *secs;
        }
        config.validate().context("Invalid command line options")?;
    }

    let _log_guard = init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Serve { .. } => serve(config).await,
        Commands::Sync => sync(config).await,
        Commands::Status { json } => status(config, json).await,
        Commands::Tools => {
            print_tools();
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let mirror = mirror_from_config(&config.mirror);
    let app = Application::new(config, mirror).context("Failed to build application")?;

    if atty::is(Stream::Stderr) {
        eprintln!("{}", "Starting uidocs MCP server...".green().bold());
    }
    let addr = app.start().await?;

    if atty::is(Stream::Stderr) {
        eprintln!("✅ Listening on http://{}/mcp", addr);
        eprintln!();
        eprintln!("📋 HTTP Endpoints:");
        eprintln!("   POST   /mcp     - Initialize session, or send a message (Mcp-Session-Id)");
        eprintln!("   GET    /mcp     - Open notification stream (Mcp-Session-Id)");
        eprintln!("   DELETE /mcp     - Terminate session (Mcp-Session-Id)");
        eprintln!("   GET    /health  - Health report");
    }

    shutdown_signal().await;
    let report = app.stop().await;

    if atty::is(Stream::Stderr) {
        eprintln!(
            "{}",
            format!(
                "Stopped: {} session(s) closed, {} failed",
                report.closed, report.failed
            )
            .cyan()
        );
    }
    Ok(())
}

async fn sync(config: ServerConfig) -> Result<()> {
    let mirror = mirror_from_config(&config.mirror);
    let outcome = mirror
        .ensure_ready()
        .await
        .context("Documentation sync failed")?;

    let revision = outcome.revision.as_deref().unwrap_or("local directory");
    if outcome.changed {
        println!("{} updated to {}", "✓".green(), revision.bold());
    } else {
        println!("{} up to date at {}", "✓".green(), revision.bold());
    }
    println!("  content: {}", mirror.content_root().display());
    Ok(())
}

async fn status(config: ServerConfig, json: bool) -> Result<()> {
    let mirror = mirror_from_config(&config.mirror);
    let status = mirror.status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let state = if status.structurally_valid {
        "ready".green()
    } else if status.present {
        "invalid".yellow()
    } else {
        "missing".red()
    };
    println!("Mirror:    {}", state);
    println!("Source:    {}", status.source);
    println!("Content:   {}", status.content_root.display());
    println!(
        "Revision:  {}",
        status.revision.as_deref().unwrap_or("-")
    );
    if let Some(synced) = status.last_synced_at {
        println!("Synced:    {}", synced.to_rfc3339());
    }
    if let Some(error) = &status.error {
        println!("Error:     {}", error.red());
    }
    Ok(())
}

fn print_tools() {
    for tool in DocsTool::ALL {
        println!("{:<24} {}", tool.name().bold(), tool.description());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
