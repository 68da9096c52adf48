//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p kart_server -- [--addr 127.0.0.1:40000] [--tick-hz 64]
//!
//! Accepts clients between ticks and steps the simulation at the
//! configured rate until interrupted.

use std::env;
use std::time::Duration;

use kart_server::GameServer;
use kart_shared::config::EngineConfig;
use tracing::info;

fn parse_args() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(64);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    let mut server = GameServer::new(cfg.clone()).await?;
    info!(addr = %server.local_addr()?, tick_hz = cfg.tick_hz, "Server listening");

    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let mut next = tokio::time::Instant::now();
    let mut last_tick = next;

    loop {
        // Admit at most one pending client per tick; the accept path may
        // stall the loop for at most this timeout.
        server.try_accept(Duration::from_millis(1)).await?;

        let now = tokio::time::Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;

        server.step(dt).await?;

        next += tick_interval;
        tokio::time::sleep_until(next).await;
    }
}
