//! addin-tell - send one command line to a loaded add-in.
//!
//! `addin-tell dbsize sales.db` is the console's `tell AddinServer dbsize sales.db`.
//! Output appears on the add-in's console, not here.
//!
//! CHANGELOG:
//! - 10/19/2026 - Initial implementation

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use addin_server::channel::{socket, ChannelError};
use addin_server::config::AddinConfig;

#[derive(Parser)]
#[command(name = "addin-tell")]
#[command(about = "Send a command to a running addin-server")]
struct Cli {
    /// Command words, e.g. `ver` or `dbsize sales.db`
    #[arg(required = true, num_args = 1..)]
    words: Vec<String>,

    /// Config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the socket queues
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Queue to send to (default: derived from the configured program name)
    #[arg(long)]
    queue: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AddinConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.runtime_dir {
        config.runtime_dir = Some(dir);
    }
    let queue = cli.queue.unwrap_or_else(|| config.queue_name());

    let line = cli.words.join(" ");
    if line.len() > config.max_message_size {
        eprintln!(
            "Warning: command is {} bytes, the add-in reads at most {}",
            line.len(),
            config.max_message_size
        );
    }

    match socket::send(&config.runtime_dir(), &queue, &line) {
        Ok(()) => Ok(()),
        Err(ChannelError::NotFound(_)) => {
            eprintln!("{} is not loaded", config.display_name);
            std::process::exit(1);
        }
        Err(e) => Err(e).with_context(|| format!("Failed to send to {}", queue)),
    }
}
