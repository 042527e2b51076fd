//! Sync Server - Serves one screen's playlist to connected clients
//!
//! Run with: cargo run --example sync_server -- [bind_addr] <url> [url...]
//!
//! This example demonstrates:
//! - Registering a screen with the authoritative `SyncRuntime`
//! - Queueing a playlist that advances when each video ends
//! - Running the periodic tick with the external duration probe
//! - Serving state to TCP clients (late joiners get the current state)
//!
//! ```text
//!   SyncRuntime ◄── ticker (2 s) ──► ffprobe / yt-dlp
//!        │
//!        └── broadcast ──► SyncServer ──► client, client, ...
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use collins_media::protocol::Bounds;
use collins_media::server::{spawn_ticker, CommandProbe, ServerConfig, SyncServer};
use collins_media::sync::{ScreenSpec, SyncRuntime};

fn print_usage() {
    eprintln!("Usage: sync_server [bind_addr] <url> [url...]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  sync_server https://cdn.example/a.mp4");
    eprintln!("  sync_server 0.0.0.0:7270 https://cdn.example/a.mp4 https://youtu.be/dQw4w9WgXcQ");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();
    if let Ok(addr) = args[0].parse::<SocketAddr>() {
        config = config.bind(addr);
        args.remove(0);
    }
    if args.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("collins_media=debug".parse()?)
                .add_directive("sync_server=debug".parse()?),
        )
        .init();

    let probe = Arc::new(CommandProbe::new(&config));
    let runtime = Arc::new(SyncRuntime::new(config));

    let screen = ScreenSpec::new("lobby", "world", Bounds::new(0, 64, 0, 15, 72, 0), 0);
    runtime.add_screen(screen, args[0].clone()).await?;
    for url in &args {
        runtime.playlist_add("lobby", url.clone()).await?;
    }
    runtime.playlist_set_looping("lobby", true).await?;
    runtime.playlist_play("lobby", 1).await?;

    println!("Serving {} video(s) on {}", args.len(), runtime.config().bind_addr);

    let ticker = spawn_ticker(Arc::clone(&runtime), probe);
    let server = SyncServer::new(runtime);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    ticker.abort();
    Ok(())
}
