//! addin-server - load the add-in under a console host
//!
//! Commands reach the running add-in through its message queue; use
//! `addin-tell` to send them.
//!
//! CHANGELOG:
//! - 10/26/2026 - Queue capacity applied to the socket queue
//! - 10/19/2026 - status subcommand
//! - 10/12/2026 - Initial CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use addin_server::channel::socket::{self, SocketChannel};
use addin_server::config::AddinConfig;
use addin_server::db::SqliteStore;
use addin_server::host::console::ConsoleHost;
use addin_server::logging::init_logging;
use addin_server::{CommandRegistry, ServiceLoop};

#[derive(Parser, Debug)]
#[command(name = "addin-server")]
#[command(version, about = "Host-resident add-in service", long_about = None)]
struct Cli {
    /// Config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the socket queues
    #[arg(long, global = true)]
    runtime_dir: Option<PathBuf>,

    /// More diagnostic logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the add-in in the foreground
    Run {
        /// Directory DBSIZE resolves database names in
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Receive timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Check whether an instance is loaded
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run_cli(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run_cli(cli: Cli) -> Result<ExitCode> {
    let mut config = AddinConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.runtime_dir {
        config.runtime_dir = Some(dir);
    }

    match cli.command {
        Command::Run { store_dir, timeout_ms } => {
            if let Some(dir) = store_dir {
                config.store_dir = Some(dir);
            }
            if let Some(ms) = timeout_ms {
                config.receive_timeout_ms = ms;
            }
            cmd_run(&config)
        }
        Command::Status => cmd_status(&config),
    }
}

fn cmd_run(config: &AddinConfig) -> Result<ExitCode> {
    let runtime_dir = config.runtime_dir();
    std::fs::create_dir_all(&runtime_dir)
        .with_context(|| format!("Failed to create runtime directory {:?}", runtime_dir))?;

    let store = Arc::new(SqliteStore::new(config.store_dir()));
    let registry = CommandRegistry::with_builtins(
        config.program_name.clone(),
        config.display_name.clone(),
        store,
    );

    let host = ConsoleHost::with_stop_signals();
    let channel = SocketChannel::new(runtime_dir).with_capacity(config.queue_capacity);
    let summary = ServiceLoop::new(&host, channel, registry, config).run();

    tracing::info!(
        exit = ?summary.exit,
        commands = summary.commands_processed,
        failed = summary.commands_failed,
        "service loop finished"
    );

    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_status(config: &AddinConfig) -> Result<ExitCode> {
    let queue = config.queue_name();
    if socket::is_loaded(&config.runtime_dir(), &queue) {
        println!("{} is loaded (queue {})", config.display_name, queue);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} is not loaded", config.display_name);
        Ok(ExitCode::from(1))
    }
}
