use clap::Parser;
use log::info;
use server::network::{Server, ServerOptions};
use shared::{GameConfig, MAX_SNAPSHOT_ENTITIES};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of connected clients across all rooms
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Maximum members per room (capped so a full snapshot fits in a datagram)
    #[arg(long, default_value_t = MAX_SNAPSHOT_ENTITIES)]
    max_room_members: usize,

    /// Broadcast a snapshot every N simulation ticks
    #[arg(short, long, default_value = "3")]
    snapshot_every: u32,

    /// Drop clients that stay silent this long
    #[arg(long, default_value = "10")]
    client_timeout_secs: u64,

    /// JSON game configuration; must match the clients' configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = GameConfig::load(args.config.as_deref())?;

    info!(
        "Starting server: {} Hz simulation, snapshot every {} ticks",
        config.tick_rate, args.snapshot_every
    );

    let options = ServerOptions {
        max_clients: args.max_clients,
        max_room_members: args.max_room_members,
        snapshot_every: args.snapshot_every,
        client_timeout: Duration::from_secs(args.client_timeout_secs),
    };
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, config, options).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
