// ABOUTME: Main entry point for relaybot: `start` runs the agent, `plugins` lists what would load
// ABOUTME: Initializes logging, config, plugins, platform backend and the HTTP server

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use relaybot::{config::Config, server, ServerState};
use relaybot_platform::PlatformRegistry;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(name = "relaybot", version, about = "Chat automation agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent (default)
    Start(StartArgs),
    /// Load the configured plugins and print the registry
    Plugins {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Default)]
struct StartArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Start(StartArgs::default())) {
        Command::Start(args) => run_start(args).await,
        Command::Plugins { config, json } => run_plugins(config.as_deref(), json),
    }
}

fn init_logging(
    default_filter: &str,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let console = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "relaybot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

async fn run_start(args: StartArgs) -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = init_logging("info", args.log_format, args.log_dir.as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting relaybot");

    let config = Config::load(args.config.as_deref())?;
    tracing::info!(
        bind = %config.bind_addr(),
        backend = %config.platform.backend,
        heartbeat = config.heartbeat.enabled,
        manifest_dir = ?config.plugins.manifest_dir,
        "Configuration loaded"
    );

    let state = ServerState::initialize(config, &PlatformRegistry::default())?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        signal.cancel();
    });

    state.serve(shutdown).await?;
    tracing::info!("relaybot stopped");
    Ok(())
}

#[derive(Serialize)]
struct PluginListing {
    commands: Vec<PluginEntry>,
    event_handlers: Vec<PluginEntry>,
    skipped: Vec<String>,
    errors: Vec<LoadErrorEntry>,
}

#[derive(Serialize)]
struct PluginEntry {
    name: String,
    description: Option<String>,
}

#[derive(Serialize)]
struct LoadErrorEntry {
    unit: String,
    error: String,
}

fn run_plugins(config_path: Option<&Path>, json: bool) -> Result<()> {
    let _guard = init_logging("warn", LogFormat::Text, None)?;
    let config = Config::load(config_path)?;
    let report = server::load_plugins(&config, Instant::now());
    let registry = &report.registry;

    let entry = |name: &str| PluginEntry {
        name: name.to_string(),
        description: registry
            .descriptors()
            .iter()
            .find(|d| relaybot_core::commands::normalize_name(d.name()) == name)
            .and_then(|d| d.description().map(String::from)),
    };
    let listing = PluginListing {
        commands: registry.commands().names().into_iter().map(entry).collect(),
        event_handlers: registry.events().names().into_iter().map(entry).collect(),
        skipped: report.skipped.clone(),
        errors: report
            .errors
            .iter()
            .map(|e| LoadErrorEntry {
                unit: e.unit.clone(),
                error: e.cause.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    print_section("Commands", &listing.commands);
    print_section("Event handlers", &listing.event_handlers);
    if !listing.skipped.is_empty() {
        println!("Skipped (no handlers):");
        for unit in &listing.skipped {
            println!("  {}", unit);
        }
    }
    if !listing.errors.is_empty() {
        println!("Load errors:");
        for error in &listing.errors {
            println!("  {}: {}", error.unit, error.error);
        }
    }
    Ok(())
}

fn print_section(title: &str, entries: &[PluginEntry]) {
    println!("{} ({}):", title, entries.len());
    for entry in entries {
        match &entry.description {
            Some(description) => println!("  {:<16} {}", entry.name, description),
            None => println!("  {}", entry.name),
        }
    }
}
