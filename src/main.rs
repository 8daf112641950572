//! collect-server
//!
//! Coordinates recording sessions between a phone app, a wearable and OBS.
//! Session metadata, sync markers and uploaded sensor files land under the
//! dataset root; OBS output is renamed into each session's folder on stop.

mod api;
mod capture;
mod config;
mod error;
mod events;
mod logging;
mod recorder;
mod server;
mod session;
mod sync;

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::info;

use config::Config;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config_path = parse_config_arg(&args)?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init_logging()?;

    info!("collect-server v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Logs written to {:?}", logging::get_log_dir()?);

    let config = Config::load(config_path)?;
    info!("Configuration loaded from {:?}", config.config_path()?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::run(config))
}

fn parse_config_arg(args: &[String]) -> Result<Option<PathBuf>> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            match iter.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("{} requires a path", arg),
            }
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Ok(Some(PathBuf::from(path)));
        }
    }
    Ok(None)
}

fn print_help() {
    println!("collect-server - Session coordinator for synchronized phone, watch and OBS capture");
    println!();
    println!("USAGE:");
    println!("    collect-server [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    -c, --config <PATH>   Use the config file at PATH");
    println!();
    println!("ENVIRONMENT:");
    println!("    COLLECT_SERVER_CONFIG     Config file path (overridden by --config)");
    println!("    COLLECT_SERVER_LOG_PATH   Log directory override");
    println!("    RUST_LOG                  Set log level (e.g., debug, info, warn)");
}
