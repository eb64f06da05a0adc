//! CLI entry point for the imglite daemon
//!
//! Parses command line arguments, starts the daemon, and echoes new event
//! log entries to stdout.

use clap::Parser;
use imglite_daemon::{Config, Daemon, EventLog};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// imglite - watches a folder and writes compressed `_lite` image copies
#[derive(Parser, Debug)]
#[command(name = "imglite")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Watch this directory, overriding the configuration
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Run a single scan batch and exit instead of watching
    #[arg(long, default_value = "false")]
    once: bool,

    /// Files or directories to process immediately on startup
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        match Config::load(&args.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", args.config.display(), e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    if let Some(directory) = args.directory {
        config.watch.directory = directory;
    }

    println!("imglite starting...");
    println!("Watch directory: {}", config.watch.directory.display());
    println!(
        "Options: delete_originals={}, convert_png_to_jpeg={}",
        config.processing.delete_originals, config.processing.convert_png_to_jpeg
    );

    let daemon = match Daemon::new(config) {
        Ok(daemon) => daemon,
        Err(e) => {
            eprintln!("Failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _echo_handle = spawn_log_echo(daemon.log());

    if !args.paths.is_empty() {
        if let Err(e) = daemon.submit_paths(args.paths.clone()).await {
            eprintln!("Failed to queue selected paths: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if args.once {
        daemon.run_once().await;
        // Let the echo task flush the tail of the log.
        tokio::time::sleep(Duration::from_millis(300)).await;
        return ExitCode::SUCCESS;
    }

    if let Err(e) = daemon.run().await {
        eprintln!("Daemon error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Poll the event log and print entries as they arrive.
fn spawn_log_echo(log: Arc<EventLog>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_seen = None;
        loop {
            for entry in log.entries_after(last_seen) {
                println!("{}", entry);
                last_seen = Some(entry.seq);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
}
