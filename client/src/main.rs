use clap::Parser;
use client::game::ClientGameState;
use client::input::InputManager;
use client::network::{LagConfig, NetworkHandle};
use client::rendering::Renderer;
use log::{error, info};
use macroquad::prelude::*;
use shared::{GameConfig, DEFAULT_ROOM};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long, default_value = DEFAULT_ROOM)]
    room: String,

    /// Simulate network latency in milliseconds (round trip)
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Random extra delay per packet, up to this many milliseconds
    #[arg(short = 'j', long, default_value = "0")]
    jitter: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: i32,

    /// JSON game configuration; must match the server's configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Side-scroller netcode".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match GameConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    let server: SocketAddr = match args.server.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid server address '{}': {}", args.server, e);
            return;
        }
    };

    info!("Connecting to: {} (room '{}')", server, args.room);
    info!("Controls: A/D to move, Space to jump, R to reconnect, Esc to quit");
    info!("Press 1/2/3 to toggle Prediction/Reconciliation/Interpolation");

    let lag = LagConfig {
        fake_ping_ms: args.fake_ping,
        jitter_ms: args.jitter,
    };
    let mut network = match NetworkHandle::spawn(server, lag) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start networking: {}", e);
            return;
        }
    };

    let renderer = Renderer::new(&config.physics);
    let mut input = InputManager::new();
    let mut game = ClientGameState::new(config, args.room);
    let mut last_frame = Instant::now();

    loop {
        while let Some((packet, received_at)) = network.try_recv() {
            game.on_packet(packet, received_at);
        }

        let (sample, events) = input.update();
        if events.quit {
            break;
        }
        if events.toggle_prediction {
            game.toggle_prediction();
        }
        if events.toggle_reconciliation {
            game.toggle_reconciliation();
        }
        if events.toggle_interpolation {
            game.toggle_interpolation();
        }
        if events.reconnect {
            if let Some(packet) = game.disconnect_packet() {
                network.send(packet);
            }
            game.reconnect();
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_frame);
        last_frame = now;

        for packet in game.update(elapsed, sample, now) {
            network.send(packet);
        }

        renderer.render(&game.view(), &game.config().level);
        next_frame().await;
    }

    if let Some(packet) = game.disconnect_packet() {
        network.send(packet);
    }
    network.shutdown();
}
