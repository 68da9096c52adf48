//! Client implementation.
//!
//! The client maintains:
//! - A reliable, ordered connection (handshake + moves out, state in)
//! - An inbox fed by a reader task; messages are applied only at the next
//!   tick boundary, never mid-tick
//! - One actor per announced kart, role-tagged at spawn: the owned kart
//!   predicts and reconciles, every other kart interpolates
//! - An optional render target per actor (absent target = no-op)

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Context;
use kart_shared::{
    config::EngineConfig,
    math::{Transform, Vec3},
    net::{ClientId, KartId, NetMsg, ReliableConn, ReliableWriter, PROTOCOL_VERSION},
    render::RenderTarget,
    sim::{simulate_move, KartState, KartTuning, Role},
    world::{CollisionWorld, FlatGround},
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    input::{build_move, InputState},
    interp::Interpolator,
    predict::Predictor,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Disconnected,
}

/// Role-tagged behavior, fixed at spawn.
enum KartBehavior {
    Controlled(Predictor),
    Remote(Interpolator),
}

/// One kart as this instance sees it.
pub struct KartActor {
    behavior: KartBehavior,
    pub transform: Transform,
    pub velocity: Vec3,
    render: Option<Box<dyn RenderTarget>>,
    /// Timestamp of the newest authoritative update applied, for ordering
    /// violation detection.
    last_authoritative: Option<f64>,
}

impl KartActor {
    pub fn role(&self) -> Role {
        match self.behavior {
            KartBehavior::Controlled(_) => Role::ControllingClient,
            KartBehavior::Remote(_) => Role::RemoteViewer,
        }
    }

    /// Number of moves awaiting acknowledgment (controlled karts only).
    pub fn pending_moves(&self) -> usize {
        match &self.behavior {
            KartBehavior::Controlled(p) => p.len(),
            KartBehavior::Remote(_) => 0,
        }
    }

    fn push_to_render(&mut self) {
        if let Some(render) = self.render.as_mut() {
            render.set_position(self.transform.position);
            render.set_rotation(self.transform.rotation);
        }
    }
}

/// High-level game client.
pub struct GameClient {
    pub client_id: ClientId,
    pub kart_id: KartId,
    pub state: ClientState,

    writer: ReliableWriter,
    inbox: mpsc::UnboundedReceiver<NetMsg>,

    karts: HashMap<KartId, KartActor>,
    tuning: KartTuning,
    world: Box<dyn CollisionWorld>,

    /// Shared simulation clock: accumulated tick time, monotonic.
    sim_clock: f64,
}

impl GameClient {
    /// Connects to a server and performs the handshake, with flat ground as
    /// the collision world.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        Self::connect_with_world(cfg, Box::new(FlatGround::default())).await
    }

    /// Connects with a caller-supplied collision world. Prediction replays
    /// through the same world the server simulates against.
    pub async fn connect_with_world(
        cfg: &EngineConfig,
        world: Box<dyn CollisionWorld>,
    ) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;

        info!(server = %server_addr, "Connecting to server");

        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        let mut conn = ReliableConn::new(stream);

        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let welcome = conn.recv().await?;
        let (client_id, kart_id) = match welcome {
            NetMsg::Welcome { client_id, kart_id } => (client_id, kart_id),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        info!(client_id = ?client_id, kart_id = ?kart_id, "Connected to server");

        let (mut reader, writer) = conn.into_split();
        let (tx, inbox) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Surface the closed connection as a disconnect so
                        // the tick loop observes it at the next boundary.
                        let _ = tx.send(NetMsg::Disconnect {
                            reason: format!("connection lost: {e}"),
                        });
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client_id,
            kart_id,
            state: ClientState::Connected,
            writer,
            inbox,
            karts: HashMap::new(),
            tuning: cfg.tuning,
            world,
            sim_clock: 0.0,
        })
    }

    /// Attaches a render target to a kart's actor.
    pub fn set_render_target(&mut self, kart_id: KartId, target: Box<dyn RenderTarget>) {
        if let Some(actor) = self.karts.get_mut(&kart_id) {
            actor.render = Some(target);
        } else {
            warn!(kart_id = ?kart_id, "No such kart to attach render target");
        }
    }

    pub fn kart(&self, kart_id: KartId) -> Option<&KartActor> {
        self.karts.get(&kart_id)
    }

    /// The actor for the kart this client controls, once spawned.
    pub fn own_kart(&self) -> Option<&KartActor> {
        self.karts.get(&self.kart_id)
    }

    pub fn kart_ids(&self) -> impl Iterator<Item = KartId> + '_ {
        self.karts.keys().copied()
    }

    /// Advances one client tick.
    ///
    /// Drains the network inbox first (messages apply at tick boundaries
    /// only), then predicts the owned kart forward and walks every remote
    /// kart's interpolation.
    pub async fn tick(&mut self, input: InputState, delta_time: f32) -> anyhow::Result<()> {
        self.apply_inbox()?;

        if self.state == ClientState::Disconnected {
            return Ok(());
        }
        if delta_time <= 0.0 {
            warn!(delta_time, "Skipping tick with non-positive delta");
            return Ok(());
        }

        self.sim_clock += f64::from(delta_time);

        // Controlled kart: simulate immediately, queue, send. No waiting
        // for acknowledgment before rendering.
        if let Some(actor) = self.karts.get_mut(&self.kart_id) {
            if let KartBehavior::Controlled(predictor) = &mut actor.behavior {
                let mv = build_move(input, delta_time, self.sim_clock);
                let (transform, velocity) = simulate_move(
                    actor.transform,
                    actor.velocity,
                    &mv,
                    &self.tuning,
                    self.world.as_ref(),
                );
                actor.transform = transform;
                actor.velocity = velocity;
                predictor.record(mv);
                actor.push_to_render();

                self.writer.send(&NetMsg::SendMove(mv)).await?;
            }
        }

        // Remote karts: cosmetic walk along the current spline segment.
        for actor in self.karts.values_mut() {
            if let KartBehavior::Remote(interp) = &mut actor.behavior {
                if let Some((position, rotation, velocity)) = interp.tick(delta_time) {
                    actor.transform = Transform::new(position, rotation);
                    actor.velocity = velocity;
                    actor.push_to_render();
                }
            }
        }

        Ok(())
    }

    fn apply_inbox(&mut self) -> anyhow::Result<()> {
        while let Ok(msg) = self.inbox.try_recv() {
            self.handle_message(msg)?;
        }
        Ok(())
    }

    fn handle_message(&mut self, msg: NetMsg) -> anyhow::Result<()> {
        match msg {
            NetMsg::KartSpawn { kart_id, state } => {
                let behavior = if kart_id == self.kart_id {
                    KartBehavior::Controlled(Predictor::new())
                } else {
                    KartBehavior::Remote(Interpolator::new())
                };
                let mut actor = KartActor {
                    behavior,
                    transform: state.transform,
                    velocity: state.velocity,
                    render: None,
                    last_authoritative: None,
                };
                if let KartBehavior::Remote(interp) = &mut actor.behavior {
                    interp.on_state_update(&state);
                }
                info!(kart_id = ?kart_id, role = ?actor.role(), "Kart spawned");
                self.karts.insert(kart_id, actor);
            }
            NetMsg::StateUpdate { kart_id, state } => {
                self.on_state_update(kart_id, state)?;
            }
            NetMsg::KartDespawn { kart_id } => {
                if self.karts.remove(&kart_id).is_some() {
                    info!(kart_id = ?kart_id, "Kart despawned");
                } else {
                    warn!(kart_id = ?kart_id, "Despawn for unknown kart");
                }
            }
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Disconnected from server");
                self.state = ClientState::Disconnected;
            }
            other => {
                debug!(?other, "Unhandled message");
            }
        }
        Ok(())
    }

    /// Change notification for the replicated state field.
    fn on_state_update(&mut self, kart_id: KartId, state: KartState) -> anyhow::Result<()> {
        let Some(actor) = self.karts.get_mut(&kart_id) else {
            warn!(kart_id = ?kart_id, "State update for unknown kart");
            return Ok(());
        };

        // The transport guarantees ordered delivery; an old or duplicate
        // update is a protocol violation, not something to absorb.
        let incoming = state.last_move.timestamp;
        if let Some(baseline) = actor.last_authoritative {
            if incoming <= baseline {
                anyhow::bail!(
                    "out-of-order state update for {kart_id:?}: {incoming} <= {baseline}"
                );
            }
        }
        actor.last_authoritative = Some(incoming);

        match &mut actor.behavior {
            KartBehavior::Controlled(predictor) => {
                let (transform, velocity) =
                    predictor.reconcile(&state, &self.tuning, self.world.as_ref());
                actor.transform = transform;
                actor.velocity = velocity;
                actor.push_to_render();
            }
            KartBehavior::Remote(interp) => {
                interp.on_state_update(&state);
            }
        }
        Ok(())
    }
}
