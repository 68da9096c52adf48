//! Server-side integration: the tick loop with no real clients attached.

use std::time::Duration;

use kart_server::server::bind_ephemeral;
use kart_shared::{
    net::{KartId, NetMsg, ReliableConn, PROTOCOL_VERSION},
    sim::Move,
};
use tokio::net::TcpStream;

const TICK_HZ: u32 = 64;

/// Raw client-side handshake, no prediction machinery.
async fn join(addr: &str) -> anyhow::Result<(ReliableConn, KartId)> {
    let stream = TcpStream::connect(addr).await?;
    let mut conn = ReliableConn::new(stream);
    conn.send(&NetMsg::Hello {
        protocol: PROTOCOL_VERSION,
    })
    .await?;
    match conn.recv().await? {
        NetMsg::Welcome { kart_id, .. } => Ok((conn, kart_id)),
        other => anyhow::bail!("expected Welcome, got {other:?}"),
    }
}

#[tokio::test]
async fn locally_driven_kart_advances() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(TICK_HZ).await?;

    let kart_id = server.spawn_local_kart();
    server.drive_local(kart_id, 1.0, 0.0);
    server.run_for_ticks(32).await?;

    let state = server
        .kart_state(kart_id)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?;
    assert!(state.velocity.x > 0.0, "throttle should build speed");
    assert!(
        state.transform.position.x > 0.0,
        "kart should move along +x, got {:?}",
        state.transform.position
    );
    assert_eq!(server.client_count(), 0);
    Ok(())
}

#[tokio::test]
async fn idle_local_kart_stays_put() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(TICK_HZ).await?;

    let kart_id = server.spawn_local_kart();
    server.run_for_ticks(16).await?;

    let state = server
        .kart_state(kart_id)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?;
    assert_eq!(state.velocity.len(), 0.0);
    Ok(())
}

/// A raw connection that compresses time gets its moves dropped with no
/// reply and no state change.
#[tokio::test(flavor = "multi_thread")]
async fn invalid_moves_are_dropped_silently() -> anyhow::Result<()> {
    let (mut server, cfg) = bind_ephemeral(TICK_HZ).await?;
    let addr = cfg.server_addr.clone();

    let (accepted, joined) = tokio::join!(server.accept_one(), join(&addr));
    accepted?;
    let (mut conn, kart_id) = joined?;

    let spawned = server
        .kart_state(kart_id)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?;
    let start = spawned.transform.position;

    // Claims to have simulated 100 seconds one instant after connecting.
    conn.send(&NetMsg::SendMove(Move {
        delta_time: 100.0,
        throttle: 1.0,
        steering: 0.0,
        timestamp: 100.0,
    }))
    .await?;
    // Out-of-range throttle on an otherwise plausible move.
    conn.send(&NetMsg::SendMove(Move {
        delta_time: 0.001,
        throttle: 4.0,
        steering: 0.0,
        timestamp: 100.1,
    }))
    .await?;

    tokio::time::sleep(Duration::from_millis(20)).await;
    server.step(1.0 / TICK_HZ as f32).await?;

    let state = server
        .kart_state(kart_id)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?;
    assert_eq!(state.transform.position, start);
    assert_eq!(state.velocity.len(), 0.0);
    Ok(())
}

/// A despawned kart frees its spawn slot; the next joiner takes the gap
/// instead of spawning on top of a live kart.
#[tokio::test(flavor = "multi_thread")]
async fn despawn_frees_the_spawn_slot() -> anyhow::Result<()> {
    let (mut server, cfg) = bind_ephemeral(TICK_HZ).await?;

    let (accepted, joined) = tokio::join!(server.accept_one(), join(&cfg.server_addr));
    accepted?;
    let (conn_a, kart_a) = joined?;
    let (accepted, joined) = tokio::join!(server.accept_one(), join(&cfg.server_addr));
    accepted?;
    let (_conn_b, kart_b) = joined?;

    let y_a = server
        .kart_state(kart_a)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?
        .transform
        .position
        .y;
    let y_b = server
        .kart_state(kart_b)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?
        .transform
        .position
        .y;
    assert_ne!(y_a, y_b, "live karts must not share a slot");

    // First client leaves; the server notices at the next tick boundary.
    drop(conn_a);
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.step(1.0 / TICK_HZ as f32).await?;
    assert!(server.kart_state(kart_a).is_none());

    let (accepted, joined) = tokio::join!(server.accept_one(), join(&cfg.server_addr));
    accepted?;
    let (_conn_c, kart_c) = joined?;

    let y_c = server
        .kart_state(kart_c)
        .ok_or_else(|| anyhow::anyhow!("kart missing"))?
        .transform
        .position
        .y;
    assert_eq!(y_c, y_a, "freed slot should be reused");
    assert_ne!(y_c, y_b);
    Ok(())
}
