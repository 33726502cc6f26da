//! Angry Miao battery CLI
//!
//! Reads the receiver's battery level over vendor HID feature reports.

use anyhow::Result;
use clap::Parser;

mod cli;
use cli::{Cli, Commands};

mod commands;

use miao_battery::ConsoleFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `--quiet` output stays machine readable
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List { vid, pid, all } => commands::list(vid, pid, all),
        Commands::Read {
            path,
            vid,
            pid,
            delay,
            retry,
            quiet,
            hex,
        } => {
            commands::read(commands::ReadOptions {
                path,
                vid,
                pid,
                delay_ms: delay,
                retry,
                quiet,
                hex,
            })
            .await
        }
        Commands::Watch {
            config,
            export_dir,
            quiet,
            json,
        } => {
            let format = if json {
                ConsoleFormat::Json
            } else if quiet {
                ConsoleFormat::Quiet
            } else {
                ConsoleFormat::Text
            };
            commands::watch(commands::WatchOptions {
                config,
                export_dir,
                format,
            })
            .await
        }
        Commands::Config { config } => commands::show_config(config).await,
    }
}
