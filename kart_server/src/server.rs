//! Server implementation.
//!
//! The authoritative tick loop:
//! - accepts clients (handshake, one kart per client)
//! - drains inbound moves at the tick boundary, never mid-tick
//! - validates each move and applies the shared simulation step
//! - advances locally-driven karts (NPC input sources) through the same step
//! - broadcasts the changed `KartState`s to every connected client
//!
//! Determinism notes:
//! - The simulation step itself is pure; all wall-clock reads live here.
//! - Iterate karts in stable (id) order when simulating and broadcasting.

use anyhow::Context;
use kart_shared::{
    config::EngineConfig,
    math::{Transform, Vec3},
    net::{
        ClientId, KartId, NetMsg, ReliableConn, ReliableListener, ReliableWriter,
        PROTOCOL_VERSION,
    },
    sim::{simulate_move, KartState, Move},
    world::{CollisionWorld, FlatGround},
};
use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};

/// Connected client state.
struct ClientSession {
    kart_id: KartId,
    writer: ReliableWriter,
    /// Per-session validation state for the speed guard.
    validator: crate::validation::MoveValidator,
    /// Wall-clock base the speed guard measures against.
    session_start: Instant,
}

/// Who produces moves for a kart.
enum Driver {
    /// Moves arrive over the network from this client.
    Remote(ClientId),
    /// Moves are synthesized server-side each tick (NPC driving).
    Local { throttle: f32, steering: f32 },
}

struct KartEntry {
    state: KartState,
    driver: Driver,
    /// Spawn slot this kart occupies; freed on despawn.
    slot: u32,
    /// Set when the state changed this tick; cleared after broadcast.
    /// The replication channel only notifies on actual changes.
    dirty: bool,
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,

    tcp: ReliableListener,
    world: Box<dyn CollisionWorld>,

    clients: HashMap<ClientId, ClientSession>,
    karts: BTreeMap<KartId, KartEntry>,

    inbound_tx: mpsc::UnboundedSender<(ClientId, NetMsg)>,
    inbound: mpsc::UnboundedReceiver<(ClientId, NetMsg)>,

    tick: u32,
    /// Server simulation clock, stamps NPC moves.
    sim_clock: f64,
}

impl GameServer {
    /// Creates a new server bound to the configured address, simulating
    /// against flat ground.
    pub async fn new(cfg: EngineConfig) -> anyhow::Result<Self> {
        Self::with_world(cfg, Box::new(FlatGround::default())).await
    }

    /// Creates a server with a caller-supplied collision world.
    pub async fn with_world(
        cfg: EngineConfig,
        world: Box<dyn CollisionWorld>,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        Ok(Self {
            cfg,
            tcp,
            world,
            clients: HashMap::new(),
            karts: BTreeMap::new(),
            inbound_tx,
            inbound,
            tick: 0,
            sim_clock: 0.0,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn kart_state(&self, kart_id: KartId) -> Option<&KartState> {
        self.karts.get(&kart_id).map(|k| &k.state)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Completed simulation steps since startup.
    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    /// Spawns a kart the server itself drives. Returns its id; steer it
    /// with [`GameServer::drive_local`].
    pub fn spawn_local_kart(&mut self) -> KartId {
        let kart_id = KartId::new_unique();
        let slot = self.next_free_slot();
        let state = KartState {
            transform: spawn_transform(slot),
            ..Default::default()
        };
        self.karts.insert(
            kart_id,
            KartEntry {
                state,
                driver: Driver::Local {
                    throttle: 0.0,
                    steering: 0.0,
                },
                slot,
                dirty: true,
            },
        );
        info!(kart_id = ?kart_id, "Spawned local kart");
        kart_id
    }

    /// Sets the current input for a locally-driven kart.
    pub fn drive_local(&mut self, kart_id: KartId, throttle: f32, steering: f32) {
        match self.karts.get_mut(&kart_id) {
            Some(KartEntry {
                driver: Driver::Local { throttle: t, steering: s },
                ..
            }) => {
                *t = throttle.clamp(-1.0, 1.0);
                *s = steering.clamp(-1.0, 1.0);
            }
            _ => warn!(kart_id = ?kart_id, "drive_local on non-local kart"),
        }
    }

    /// Accepts exactly one client (handshake + kart spawn). Blocks until a
    /// connection arrives.
    pub async fn accept_one(&mut self) -> anyhow::Result<ClientId> {
        let (conn, peer) = self.tcp.accept().await?;
        self.handle_new_connection(conn, peer).await
    }

    /// Accepts a client with timeout (non-blocking).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<ClientId>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok((conn, peer))) => self.handle_new_connection(conn, peer).await.map(Some),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None), // Timeout
        }
    }

    async fn handle_new_connection(
        &mut self,
        mut conn: ReliableConn,
        peer: SocketAddr,
    ) -> anyhow::Result<ClientId> {
        let msg = conn.recv().await?;
        match msg {
            NetMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {
                let client_id = ClientId::new_unique();
                let kart_id = KartId::new_unique();
                conn.send(&NetMsg::Welcome { client_id, kart_id }).await?;

                // Announce every existing kart to the newcomer.
                for (&id, entry) in &self.karts {
                    conn.send(&NetMsg::KartSpawn {
                        kart_id: id,
                        state: entry.state,
                    })
                    .await?;
                }

                let slot = self.next_free_slot();
                let state = KartState {
                    transform: spawn_transform(slot),
                    ..Default::default()
                };

                let (mut reader, writer) = conn.into_split();
                let tx = self.inbound_tx.clone();
                tokio::spawn(async move {
                    loop {
                        match reader.recv().await {
                            Ok(msg) => {
                                if tx.send((client_id, msg)).is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                let _ = tx.send((
                                    client_id,
                                    NetMsg::Disconnect {
                                        reason: "connection lost".to_string(),
                                    },
                                ));
                                break;
                            }
                        }
                    }
                });

                self.clients.insert(
                    client_id,
                    ClientSession {
                        kart_id,
                        writer,
                        validator: crate::validation::MoveValidator::new(),
                        session_start: Instant::now(),
                    },
                );
                self.karts.insert(
                    kart_id,
                    KartEntry {
                        state,
                        driver: Driver::Remote(client_id),
                        slot,
                        dirty: false,
                    },
                );

                // Announce the new kart to everyone, including its owner.
                self.broadcast(&NetMsg::KartSpawn { kart_id, state }).await;

                info!(client_id = ?client_id, kart_id = ?kart_id, %peer, "Client connected");
                Ok(client_id)
            }
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one simulation step.
    pub async fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        self.apply_inbound().await;
        self.simulate_local(dt_sec);
        self.broadcast_dirty().await;
        self.tick += 1;
        Ok(())
    }

    /// Drains queued network messages. Moves are validated and applied
    /// here, at the tick boundary.
    async fn apply_inbound(&mut self) {
        let mut disconnected = Vec::new();
        while let Ok((client_id, msg)) = self.inbound.try_recv() {
            match msg {
                NetMsg::SendMove(mv) => self.on_move(client_id, mv),
                NetMsg::Disconnect { reason } => {
                    info!(client_id = ?client_id, reason = %reason, "Client disconnected");
                    disconnected.push(client_id);
                }
                other => {
                    debug!(client_id = ?client_id, ?other, "Unexpected message");
                }
            }
        }
        for client_id in disconnected {
            self.remove_client(client_id).await;
        }
    }

    /// Validates and applies one move from the owning client.
    ///
    /// Rejection is silent at the protocol level: no state change, no
    /// broadcast, no reply. The client self-corrects from the next
    /// accepted snapshot.
    fn on_move(&mut self, client_id: ClientId, mv: Move) {
        let Some(session) = self.clients.get_mut(&client_id) else {
            warn!(client_id = ?client_id, "Move from unknown client");
            return;
        };

        let wall_clock = session.session_start.elapsed().as_secs_f64();
        if let Err(reason) = session.validator.validate(&mv, wall_clock) {
            warn!(client_id = ?client_id, ?reason, "Rejected move");
            return;
        }

        let kart_id = session.kart_id;
        let Some(entry) = self.karts.get_mut(&kart_id) else {
            warn!(kart_id = ?kart_id, "Move for missing kart");
            return;
        };
        if !matches!(entry.driver, Driver::Remote(owner) if owner == client_id) {
            warn!(client_id = ?client_id, kart_id = ?kart_id, "Move for a kart this client does not drive");
            return;
        }

        let (transform, velocity) = simulate_move(
            entry.state.transform,
            entry.state.velocity,
            &mv,
            &self.cfg.tuning,
            self.world.as_ref(),
        );
        entry.state = KartState {
            velocity,
            last_move: mv,
            transform,
        };
        entry.dirty = true;
    }

    /// Advances locally-driven karts through the same simulation step the
    /// networked ones use. The authority is whoever may mutate canonical
    /// state, networked or not.
    fn simulate_local(&mut self, dt_sec: f32) {
        if dt_sec <= 0.0 {
            return;
        }
        self.sim_clock += f64::from(dt_sec);

        for entry in self.karts.values_mut() {
            let Driver::Local { throttle, steering } = entry.driver else {
                continue;
            };
            let mv = Move {
                delta_time: dt_sec,
                throttle,
                steering,
                timestamp: self.sim_clock,
            };
            let (transform, velocity) = simulate_move(
                entry.state.transform,
                entry.state.velocity,
                &mv,
                &self.cfg.tuning,
                self.world.as_ref(),
            );
            entry.state = KartState {
                velocity,
                last_move: mv,
                transform,
            };
            entry.dirty = true;
        }
    }

    /// Publishes every changed kart state to all viewers.
    async fn broadcast_dirty(&mut self) {
        let mut updates = Vec::new();
        for (&kart_id, entry) in self.karts.iter_mut() {
            if entry.dirty {
                entry.dirty = false;
                updates.push(NetMsg::StateUpdate {
                    kart_id,
                    state: entry.state,
                });
            }
        }
        for update in &updates {
            self.broadcast(update).await;
        }
    }

    async fn broadcast(&mut self, msg: &NetMsg) {
        let mut failed = Vec::new();
        for (&client_id, session) in self.clients.iter_mut() {
            if let Err(e) = session.writer.send(msg).await {
                warn!(client_id = ?client_id, error = %e, "Broadcast failed");
                failed.push(client_id);
            }
        }
        for client_id in failed {
            self.remove_client_sync(client_id);
        }
    }

    async fn remove_client(&mut self, client_id: ClientId) {
        if let Some(kart_id) = self.remove_client_sync(client_id) {
            self.broadcast(&NetMsg::KartDespawn { kart_id }).await;
        }
    }

    fn remove_client_sync(&mut self, client_id: ClientId) -> Option<KartId> {
        let session = self.clients.remove(&client_id)?;
        self.karts.remove(&session.kart_id);
        info!(client_id = ?client_id, kart_id = ?session.kart_id, "Client removed");
        Some(session.kart_id)
    }

    /// Lowest slot no live kart occupies. Despawns free their slot for the
    /// next join rather than stacking new karts ever further sideways.
    fn next_free_slot(&self) -> u32 {
        let mut slot = 0;
        while self.karts.values().any(|k| k.slot == slot) {
            slot += 1;
        }
        slot
    }
}

/// Spawn positions staggered sideways so karts do not overlap.
fn spawn_transform(slot: u32) -> Transform {
    Transform::new(Vec3::new(0.0, slot as f32 * 300.0, 0.0), Default::default())
}

/// Helper for tests: bind to an ephemeral loopback port and report the
/// resolved address back through the config.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, EngineConfig)> {
    let cfg = EngineConfig {
        server_addr: "127.0.0.1:0".to_string(),
        tick_hz,
        ..Default::default()
    };

    let mut server = GameServer::new(cfg).await?;
    server.cfg.server_addr = server.local_addr()?.to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}
