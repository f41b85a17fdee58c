//! ConnSync CLI - Catalog Connection Synchronizer
//!
//! Runs the connection event monitor or its one-shot tools.

use anyhow::{Context, Result};
use clap::Parser;
use connsync::catalog::HttpCatalog;
use connsync::config::{CliArgs, Commands, MonitorConfig, OutputFormat};
use connsync::events::{decode_frame, Decoded};
use connsync::monitor::{ConnectionMonitor, WebSocketTransport};
use connsync::sync::{CatalogSynchronizer, ConnectionSynchronizer};
use connsync::workspace::{InMemoryWorkspace, JsonFileWorkspace, Workspace};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Handle result
    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Default level from -v/-q; `RUST_LOG` takes precedence when set
fn init_logging(args: &CliArgs) {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn run(args: CliArgs) -> Result<()> {
    match &args.command {
        Commands::Decode { frame } => cmd_decode(frame.as_deref()),
        Commands::ShowConfig => {
            let config = MonitorConfig::from_cli(&args)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Reconcile { format, .. } => {
            let config = MonitorConfig::from_cli(&args)?;
            cmd_reconcile(config, args.workspace.as_deref(), *format).await
        }
        Commands::Monitor { .. } => {
            let config = MonitorConfig::from_cli(&args)?;
            cmd_monitor(config, args.workspace.as_deref()).await
        }
    }
}

fn open_workspace(path: Option<&Path>) -> Result<Arc<dyn Workspace>> {
    match path {
        Some(path) => {
            let workspace = JsonFileWorkspace::open(path)
                .with_context(|| format!("Failed to open workspace {}", path.display()))?;
            Ok(Arc::new(workspace))
        }
        None => {
            tracing::warn!("No workspace file given, changes are kept in memory only");
            Ok(Arc::new(InMemoryWorkspace::new()))
        }
    }
}

fn build_synchronizer(
    config: &MonitorConfig,
    workspace: Option<&Path>,
) -> Result<Arc<CatalogSynchronizer>> {
    let catalog = Arc::new(HttpCatalog::new(config.clone()).context("Failed to build catalog client")?);
    let workspace = open_workspace(workspace)?;
    Ok(Arc::new(CatalogSynchronizer::new(catalog, workspace)))
}

async fn cmd_monitor(config: MonitorConfig, workspace: Option<&Path>) -> Result<()> {
    let synchronizer = build_synchronizer(&config, workspace)?;
    let transport =
        Arc::new(WebSocketTransport::new(config.clone()).context("Failed to build event transport")?);

    tracing::info!(
        stream = %config.stream_url,
        poll_interval = %humantime::format_duration(config.poll_interval),
        max_retries = config.max_retries,
        "Starting connection monitor"
    );

    let monitor = Arc::new(ConnectionMonitor::new(config, transport, synchronizer));
    let cancel = CancellationToken::new();
    let handle = monitor.start(cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    tracing::info!("Interrupt received, shutting down");

    cancel.cancel();
    handle.await.context("Monitor task failed")?;

    let pending = monitor.pending_ids();
    if !pending.is_empty() {
        tracing::warn!("{} change(s) were still pending: {:?}", pending.len(), pending);
    }
    Ok(())
}

async fn cmd_reconcile(
    config: MonitorConfig,
    workspace: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let synchronizer = build_synchronizer(&config, workspace)?;
    let report = synchronizer
        .synchronize_connections()
        .await
        .with_context(|| format!("Reconciliation against {} failed", config.catalog_url))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("=== Reconciliation ===");
            println!("{}", report);
            for name in &report.added {
                println!("  + {}", name);
            }
            for name in &report.updated {
                println!("  ~ {}", name);
            }
            for name in &report.removed {
                println!("  - {}", name);
            }
        }
    }
    Ok(())
}

fn cmd_decode(frame: Option<&str>) -> Result<()> {
    let text = match frame {
        Some(frame) => frame.to_string(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read frame from stdin")?;
            buf
        }
    };

    match decode_frame(text.trim()).context("Frame could not be decoded")? {
        Decoded::Connected => println!("handshake: subscription confirmed"),
        Decoded::Change(event) => println!("change: {}", event),
        Decoded::IgnoredKind(event) => {
            println!("ignored: {} (kind '{}' is not handled)", event, event.kind)
        }
        Decoded::Other(message) => {
            println!("other: event '{}' with data '{}'", message.event, message.data)
        }
    }
    Ok(())
}
