//! rvpnmux Client Binary
//!
//! Manages saved connections from the command line and keeps one tunnel up
//! until interrupted.

use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};
use rvpnmux::{
    config::Config,
    error::{Result, VpnError},
    logging, ConnectionStore, Logger, UrlParser, VpnService,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::signal;

#[derive(Parser)]
#[command(name = "rvpnmux-client")]
#[command(about = "Multi-protocol VPN client: manage share links and run one tunnel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rvpnmux.toml")]
    config: PathBuf,

    /// Settings document with saved connections (overrides config)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a share link and print the resulting record
    Parse { url: String },
    /// Save a share link
    Add { url: String },
    /// List saved connections
    List,
    /// Forget a saved connection
    Remove { id: String },
    /// Connect and report metrics until Ctrl+C
    Connect {
        id: String,
        /// Disconnect after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Set the connection mode (proxy, tun or tap)
    Mode { mode: String },
    /// Set the interface language (en or ru)
    Language { language: String },
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    logging::init(level);
    debug!("Starting {} v{}", rvpnmux::NAME, rvpnmux::VERSION);

    if let Err(e) = run(args, config).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Load configuration from file, falling back to defaults when it is missing
fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::from_file(path)?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn open_store(args: &Args, config: &Config) -> Result<ConnectionStore> {
    let path = args
        .store
        .clone()
        .or_else(|| config.storage.path.clone())
        .or_else(ConnectionStore::default_path);

    match path {
        Some(path) => {
            debug!("Using settings document {}", path.display());
            ConnectionStore::open(path)
        }
        None => {
            warn!("No home directory found, connections will not be saved");
            Ok(ConnectionStore::in_memory())
        }
    }
}

async fn run(args: Args, config: Config) -> Result<()> {
    match &args.command {
        Command::Parse { url } => {
            let record = UrlParser::new(Logger::global()).parse(url)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            return Ok(());
        }
        Command::ShowConfig => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        _ => {}
    }

    let store = open_store(&args, &config)?;
    let service = VpnService::with_store(&config, store, Logger::global())?;

    let outcome = match args.command {
        Command::Add { url } => {
            let reply = service.add_connection(&url)?;
            println!("{}", reply.id.unwrap_or_default());
            Ok(())
        }
        Command::List => {
            for connection in service.get_connections()? {
                println!(
                    "{}  {:<12} {}",
                    connection.id, connection.protocol, connection.name
                );
            }
            Ok(())
        }
        Command::Remove { id } => service.remove_connection(&id).map(|_| ()),
        Command::Connect { id, duration } => {
            run_session(&service, &id, duration.map(Duration::from_secs)).await
        }
        Command::Mode { mode } => service.set_connection_mode(&mode).await.map(|_| ()),
        Command::Language { language } => service.set_language(&language).map(|_| ()),
        Command::Parse { .. } | Command::ShowConfig => Ok(()),
    };

    command_result(outcome, service.shutdown().await)
}

/// The command's own outcome wins; a shutdown failure is only logged
fn command_result(outcome: Result<()>, shutdown: Result<()>) -> Result<()> {
    if let Err(e) = shutdown {
        warn!("Shutdown failed: {e}");
    }
    outcome
}

/// Connect, print metrics once per second and disconnect on a signal
async fn run_session(service: &VpnService, id: &str, duration: Option<Duration>) -> Result<()> {
    service.connect(id).await?;
    let mode = service.manager().mode().await;
    info!("Connected to {id} in {mode} mode. Press Ctrl+C to disconnect.");

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let shutdown_signal = shutdown_signal();
    tokio::pin!(shutdown_signal);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break;
            }
            _ = &mut deadline => {
                info!("Session duration elapsed");
                break;
            }
            _ = ticker.tick() => {
                let status = service.get_connection_status().await;
                if !status.connected {
                    return Err(VpnError::NotConnected);
                }
                let metrics = service.get_connection_metrics().await;
                println!(
                    "{:>10} B/s  ping {:>4} ms  jitter {:>3} ms  rx {:>12} B  tx {:>12} B",
                    metrics.throughput,
                    metrics.ping,
                    metrics.jitter,
                    metrics.bytes_received,
                    metrics.bytes_sent
                );
            }
        }
    }

    service.disconnect().await?;
    info!("Disconnected");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            debug!("Received Ctrl+C");
        }
        _ = terminate() => {
            debug!("Received SIGTERM");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
