//! Client-side prediction and reconciliation.
//!
//! The controlling client applies each move locally the instant it is
//! created (zero-latency feel), queues it, and sends it to the authority.
//! When an authoritative state arrives, `reconcile` snaps to it, drops the
//! moves the authority has already consumed, and replays the rest through
//! the same deterministic step. With no in-flight moves the replay is a
//! no-op and the client lands exactly on the authoritative state.

use std::collections::VecDeque;

use kart_shared::{
    math::{Transform, Vec3},
    sim::{simulate_move, KartState, KartTuning, Move},
    world::CollisionWorld,
};
use tracing::debug;

/// Pending-move queue for the controlled kart.
///
/// Insertion order equals timestamp order; every element is strictly newer
/// than the last acknowledged move. Length is bounded by round-trip latency
/// times the tick rate, not by input history depth.
#[derive(Default)]
pub struct Predictor {
    pending: VecDeque<Move>,
}

impl Predictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a move after it was applied to the local state.
    pub fn record(&mut self, mv: Move) {
        self.pending.push_back(mv);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Applies a new authoritative state.
    ///
    /// Snaps to the received transform/velocity, prunes every queued move
    /// with `timestamp <= state.last_move.timestamp`, and replays the
    /// remainder in order. Returns the corrected local state.
    pub fn reconcile(
        &mut self,
        state: &KartState,
        tuning: &KartTuning,
        world: &dyn CollisionWorld,
    ) -> (Transform, Vec3) {
        let ack = state.last_move.timestamp;
        let before = self.pending.len();
        self.pending.retain(|mv| mv.timestamp > ack);
        debug!(
            acked = before - self.pending.len(),
            remaining = self.pending.len(),
            ack_time = ack,
            "reconciled against authoritative state"
        );

        let mut transform = state.transform;
        let mut velocity = state.velocity;
        for mv in &self.pending {
            let (t, v) = simulate_move(transform, velocity, mv, tuning, world);
            transform = t;
            velocity = v;
        }
        (transform, velocity)
    }
}
