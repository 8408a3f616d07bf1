//! Arena match server.
//!
//! Hosts rooms in memory and speaks the JSON protocol over stdin/stdout,
//! one message per line. Each input line is a [`ClientEnvelope`] naming
//! the sending player; each output line is a server message. Logs go to
//! stderr.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 10 Hz, 100 rooms, 2 players per room
//! cargo run -p arena_server
//!
//! # Custom config and snapshot streaming
//! cargo run -p arena_server -- --config server.ron --stream-snapshots
//! ```
//!
//! [`ClientEnvelope`]: arena_server::protocol::ClientEnvelope

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arena_core::config::MatchConfig;
use arena_server::protocol::{self, ServerMessage};
use arena_server::registry::RoomRegistry;
use arena_server::{ServerConfig, ServerError};

#[derive(Parser)]
#[command(name = "arena_server")]
#[command(about = "Authoritative arena match server")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Server config (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Match tuning (RON)
    #[arg(long)]
    match_config: Option<PathBuf>,

    /// Override the tick rate in Hz
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Override the room limit
    #[arg(long)]
    max_rooms: Option<usize>,

    /// Push every snapshot of rooms created in this session to stdout
    #[arg(long)]
    stream_snapshots: bool,
}

fn load(cli: &Cli) -> Result<(ServerConfig, MatchConfig), ServerError> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(tick_rate) = cli.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(max_rooms) = cli.max_rooms {
        config.max_rooms = max_rooms;
    }

    let match_config = match &cli.match_config {
        Some(path) => {
            let source = std::fs::read_to_string(path)?;
            MatchConfig::from_ron_str(&source)?
        }
        None => MatchConfig::default(),
    };
    Ok((config, match_config))
}

fn emit(message: &ServerMessage) {
    println!("{}", protocol::encode(message));
}

fn stream_snapshots(registry: &RoomRegistry, reply: &ServerMessage) {
    let ServerMessage::MatchCreated { match_id } = reply else {
        return;
    };
    let Ok(mut receiver) = registry.subscribe(*match_id) else {
        return;
    };
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(snapshot) => emit(&ServerMessage::snapshot(&snapshot)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "snapshot stream lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn serve(registry: RoomRegistry, stream: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                let reply = match protocol::decode_envelope(&line) {
                    Ok(envelope) => protocol::route(&registry, &envelope.player_id, envelope.message),
                    Err(error) => error,
                };
                if stream {
                    stream_snapshots(&registry, &reply);
                }
                emit(&reply);
            }
            Ok(None) => {
                tracing::info!("stdin closed");
                break;
            }
            Err(error) => {
                tracing::error!(%error, "failed to read stdin");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let (config, match_config) = match load(&cli) {
        Ok(loaded) => loaded,
        Err(error) => {
            tracing::error!(%error, "failed to load configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        port = config.port,
        tick_rate = config.tick_rate,
        max_rooms = config.max_rooms,
        "Starting arena server"
    );

    let registry = RoomRegistry::new(config, match_config);

    let sweeper = registry.clone();
    let heartbeat = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweeper.config().heartbeat_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            sweeper.sweep_heartbeats(tokio::time::Instant::now());
        }
    });

    tokio::select! {
        () = serve(registry.clone(), cli.stream_snapshots) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                tracing::error!(%error, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
        }
    }

    heartbeat.abort();
    registry.shutdown();
    tracing::info!("arena server stopped");
}
