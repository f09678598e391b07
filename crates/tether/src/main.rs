//! Tether - resilient Matrix session keeper
//!
//! Main entry point for the tether CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{config, connect, messages, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tether - keeps a Matrix session alive across restarts and token expiry
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of the discovered ones
    #[arg(short, long, global = true, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in (or restore the saved session) and confirm identity
    Connect(connect::ConnectArgs),

    /// Show the saved session without contacting the homeserver
    Status(status::StatusArgs),

    /// Fetch a room's recent messages
    Messages(messages::MessagesArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

const CRATES: &[&str] = &[
    "tether",
    "tether_client",
    "tether_config",
    "tether_session",
    "tether_resilience",
];

fn directives(level: &str, fallback: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{}={}", c, level)).collect();
    parts.push(fallback.to_string());
    parts.join(",")
}

/// Console (human-readable, stderr) plus a daily-rolling file.
///
/// The file layer is skipped when the log directory cannot be created.
fn init_tracing(ctx: &commands::Context) -> Option<WorkerGuard> {
    let console_filter = if ctx.verbose {
        directives("debug", "info")
    } else {
        directives("info", "warn")
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_filter));

    let loaded = ctx.load_config().ok();
    let log_dir = loaded
        .as_ref()
        .and_then(|l| l.config.log_directory())
        .or_else(|| tether_config::xdg_config_dir().map(|d| d.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let json_file = loaded.as_ref().map(|l| l.config.log_json()).unwrap_or(true);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("tether")
        .filename_suffix("log")
        .build(&log_dir)
        .ok();
    let (writer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = writer.clone().filter(|_| json_file).map(|w| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(w)
            .with_filter(EnvFilter::new(directives("trace", "info")))
    });
    let text_layer = writer.filter(|_| !json_file).map(|w| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(w)
            .with_filter(EnvFilter::new(directives("trace", "info")))
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(json_layer)
        .with(text_layer)
        .init();

    if let Some(loaded) = loaded {
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
    }

    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    let _guard = init_tracing(&ctx);

    match cli.command {
        Commands::Connect(args) => connect::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Messages(args) => messages::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
