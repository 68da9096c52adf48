//! Full-stack integration over loopback sockets: prediction, server
//! acknowledgment, reconciliation, and remote-viewer interpolation.
//!
//! Ticks use measured wall time. Moves stamped with synthetic fixed steps
//! run ahead of the wall clock and the server's speed guard drops them.

use std::time::Duration;

use kart_client::client::{ClientState, GameClient};
use kart_client::input::InputState;
use kart_server::server::bind_ephemeral;
use kart_shared::config::EngineConfig;
use kart_shared::net::{ClientId, KartId, NetMsg, ReliableListener, PROTOCOL_VERSION};
use kart_shared::render::RecordingRender;
use kart_shared::sim::{KartState, Move, Role};
use tokio::time::Instant;

const TICK_HZ: u32 = 64;

fn tick_interval() -> Duration {
    Duration::from_secs_f32(1.0 / TICK_HZ as f32)
}

#[tokio::test(flavor = "multi_thread")]
async fn controlled_kart_predicts_and_reconciles() -> anyhow::Result<()> {
    let (mut server, cfg) = bind_ephemeral(TICK_HZ).await?;

    let (accepted, client) = tokio::join!(server.accept_one(), GameClient::connect(&cfg));
    accepted?;
    let mut client = client?;

    let input = InputState {
        throttle: 1.0,
        steering: 0.0,
    };
    let mut last = Instant::now();
    for _ in 0..60 {
        tokio::time::sleep(tick_interval()).await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;

        client.tick(input, dt).await?;
        // Let the move cross the loopback before the server drains its inbox.
        tokio::time::sleep(Duration::from_millis(1)).await;
        server.step(dt).await?;
    }

    // Attach a render target mid-run: prediction and reconciliation both
    // push the corrected transform into it from here on.
    let render = RecordingRender::new();
    client.set_render_target(client.kart_id, Box::new(render.clone()));
    for _ in 0..5 {
        tokio::time::sleep(tick_interval()).await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;
        client.tick(input, dt).await?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        server.step(dt).await?;
    }

    // One more exchange so the final acknowledgments land client-side.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let now = Instant::now();
    let dt = (now - last).as_secs_f32();
    client.tick(input, dt).await?;

    assert_eq!(client.state, ClientState::Connected);

    let own = client
        .own_kart()
        .ok_or_else(|| anyhow::anyhow!("own kart never spawned"))?;
    assert_eq!(own.role(), Role::ControllingClient);
    assert!(
        own.transform.position.x > 50.0,
        "full throttle should cover ground, got {:?}",
        own.transform.position
    );
    assert!(
        own.pending_moves() < 10,
        "server acks should prune the queue, {} still pending",
        own.pending_moves()
    );

    // The predicted position never falls behind what the server has
    // already confirmed.
    let authoritative = server
        .kart_state(client.kart_id)
        .ok_or_else(|| anyhow::anyhow!("server lost the kart"))?;
    assert!(authoritative.transform.position.x > 0.0);
    assert!(own.transform.position.x >= authoritative.transform.position.x - 1.0);

    // Every predicted tick after the attach wrote to the render sink.
    let positions = render.positions();
    assert!(positions.len() >= 5, "expected writes, got {positions:?}");
    assert!(!render.rotations().is_empty());
    let last_write = positions[positions.len() - 1];
    assert_eq!(last_write, own.transform.position);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_viewer_follows_another_kart() -> anyhow::Result<()> {
    let (mut server, cfg) = bind_ephemeral(TICK_HZ).await?;

    let (accepted, driver) = tokio::join!(server.accept_one(), GameClient::connect(&cfg));
    accepted?;
    let mut driver = driver?;

    let (accepted, viewer) = tokio::join!(server.accept_one(), GameClient::connect(&cfg));
    accepted?;
    let mut viewer = viewer?;

    let full = InputState {
        throttle: 1.0,
        steering: 0.0,
    };
    let idle = InputState::default();

    let mut last = Instant::now();
    for _ in 0..80 {
        tokio::time::sleep(tick_interval()).await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;

        driver.tick(full, dt).await?;
        viewer.tick(idle, dt).await?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        server.step(dt).await?;
    }

    // Watch the driver's kart through a render sink: every interpolation
    // tick must push the smoothed transform into it.
    let render = RecordingRender::new();
    viewer.set_render_target(driver.kart_id, Box::new(render.clone()));
    for _ in 0..20 {
        tokio::time::sleep(tick_interval()).await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;
        driver.tick(full, dt).await?;
        viewer.tick(idle, dt).await?;
        tokio::time::sleep(Duration::from_millis(1)).await;
        server.step(dt).await?;
    }

    // Both peers learn about both karts.
    assert!(driver.kart(viewer.kart_id).is_some());
    let watched = viewer
        .kart(driver.kart_id)
        .ok_or_else(|| anyhow::anyhow!("viewer never saw the driver's kart"))?;
    assert_eq!(watched.role(), Role::RemoteViewer);

    // The interpolated proxy trails the authority but clearly moves.
    assert!(
        watched.transform.position.x > 50.0,
        "interpolated kart should follow, got {:?}",
        watched.transform.position
    );

    // The idle viewer's own kart stays on its spawn slot.
    let own = viewer
        .own_kart()
        .ok_or_else(|| anyhow::anyhow!("viewer kart never spawned"))?;
    assert_eq!(own.role(), Role::ControllingClient);
    assert!(own.velocity.len() < 0.01);

    // The interpolated proxy kept moving forward while being recorded.
    let positions = render.positions();
    assert!(positions.len() >= 20, "expected writes, got {}", positions.len());
    let first = positions[0];
    let final_write = positions[positions.len() - 1];
    assert!(
        final_write.x > first.x,
        "render writes should advance, {first:?} -> {final_write:?}"
    );
    assert!(!render.rotations().is_empty());

    Ok(())
}

/// The transport is ordered, so a snapshot that does not advance the move
/// timestamp can only mean a protocol bug; the client must fail hard
/// instead of absorbing it.
#[tokio::test(flavor = "multi_thread")]
async fn repeated_state_update_is_a_hard_error() -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = "127.0.0.1:0".parse()?;
    let listener = ReliableListener::bind(addr).await?;
    let cfg = EngineConfig {
        server_addr: listener.local_addr()?.to_string(),
        ..Default::default()
    };

    // Hand-rolled authority end: handshake, spawn, then misbehave.
    let accept = async {
        let (mut conn, _peer) = listener.accept().await?;
        match conn.recv().await? {
            NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
            other => anyhow::bail!("expected Hello, got {other:?}"),
        }
        let kart_id = KartId::new_unique();
        conn.send(&NetMsg::Welcome {
            client_id: ClientId::new_unique(),
            kart_id,
        })
        .await?;
        conn.send(&NetMsg::KartSpawn {
            kart_id,
            state: KartState::default(),
        })
        .await?;
        anyhow::Ok((conn, kart_id))
    };
    let (authority, client) = tokio::join!(accept, GameClient::connect(&cfg));
    let (mut conn, kart_id) = authority?;
    let mut client = client?;

    let snapshot = KartState {
        last_move: Move {
            timestamp: 1.0,
            ..Default::default()
        },
        ..Default::default()
    };

    conn.send(&NetMsg::StateUpdate {
        kart_id,
        state: snapshot,
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.tick(InputState::default(), 0.01).await?;

    // The same snapshot again: identical move timestamp, must not be
    // silently absorbed.
    conn.send(&NetMsg::StateUpdate {
        kart_id,
        state: snapshot,
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let result = client.tick(InputState::default(), 0.01).await;
    assert!(result.is_err(), "stale snapshot must surface as an error");

    Ok(())
}
