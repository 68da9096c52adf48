//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p kart_client -- [--addr 127.0.0.1:40000] [--tick-hz 64]
//!
//! The client connects to the server, drives its kart with a scripted
//! throttle/steering pattern, and logs reconciliation state. In a real
//! build the input would come from the windowing layer.

use std::env;
use std::time::Duration;

use anyhow::Context;
use kart_client::client::{ClientState, GameClient};
use kart_client::input::InputState;
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
    info!(server = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;

    let tick_interval = Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let mut tick: u64 = 0;
    let mut last_tick = tokio::time::Instant::now();

    loop {
        tokio::time::sleep(tick_interval).await;

        // Measure the real elapsed time. Moves stamped with a synthetic
        // fixed step run ahead of the wall clock and the server drops them.
        let now = tokio::time::Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;

        // Scripted driving: full throttle, weaving left and right.
        let input = InputState {
            throttle: 1.0,
            steering: ((tick as f32) * tick_interval.as_secs_f32() * 0.5).sin(),
        };

        client.tick(input, dt).await?;

        if client.state == ClientState::Disconnected {
            info!("Disconnected from server");
            break;
        }

        if tick % u64::from(cfg.tick_hz) == 0 {
            if let Some(kart) = client.own_kart() {
                info!(
                    position = ?kart.transform.position,
                    speed = kart.velocity.len(),
                    pending = kart.pending_moves(),
                    "Own kart"
                );
            }
        }

        tick += 1;
    }

    Ok(())
}
