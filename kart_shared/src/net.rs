//! Networking primitives.
//!
//! Goals:
//! - Reliable, in-order delivery on both channels. Reconciliation and
//!   interpolation baselines assume monotonic arrival, so moves and state
//!   updates both ride the TCP stream; there is no unreliable path.
//! - Keep serialization explicit and versionable.
//!
//! The connection splits into read/write halves so a reader task can pump
//! inbound messages into an inbox while the tick loop keeps the writer.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};
use tracing::debug;

use crate::sim::{KartState, Move};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_KART_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifies one kart. Karts may exist without a client (NPC drivers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KartId(pub u32);

impl KartId {
    pub fn new_unique() -> Self {
        KartId(NEXT_KART_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    /// Server assigns ids; `kart_id` is the kart this client controls.
    Welcome {
        client_id: ClientId,
        kart_id: KartId,
    },

    // ─── Replication ───
    /// Server announces a kart (existing karts on join, new karts later).
    KartSpawn {
        kart_id: KartId,
        state: KartState,
    },
    /// Authority → all viewers: the replicated state field changed.
    StateUpdate {
        kart_id: KartId,
        state: KartState,
    },
    /// Server removes a kart (its driver disconnected).
    KartDespawn {
        kart_id: KartId,
    },

    // ─── Gameplay ───
    /// Client → authority: one predicted move. Rejection is silent.
    SendMove(Move),

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.stream.write_all(&frame).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into reader/writer halves with independent ownership.
    pub fn into_split(self) -> (ReliableReader, ReliableWriter) {
        let (read, write) = self.stream.into_split();
        (ReliableReader { read }, ReliableWriter { write })
    }
}

/// Read half of a split connection.
#[derive(Debug)]
pub struct ReliableReader {
    read: OwnedReadHalf,
}

impl ReliableReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.read).await
    }
}

/// Reads one length-prefixed frame, the counterpart of `encode_frame`.
async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> anyhow::Result<NetMsg> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    serde_json::from_slice(&payload).context("deserialize msg")
}

/// Write half of a split connection.
#[derive(Debug)]
pub struct ReliableWriter {
    write: OwnedWriteHalf,
}

impl ReliableWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.write.write_all(&frame).await.context("tcp write")?;
        Ok(())
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        debug!(addr = %listener.local_addr()?, "Listening");
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        debug!(peer = %addr, "Accepted connection");
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

fn encode_frame(msg: &NetMsg) -> anyhow::Result<BytesMut> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}
