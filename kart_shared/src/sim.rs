//! Deterministic kart simulation step.
//!
//! One function, `simulate_move`, advances a kart by one move. It is pure:
//! identical inputs produce bit-identical outputs, on the server and on
//! every client. That determinism is what makes replay-based reconciliation
//! valid: the controlling client re-runs its unacknowledged moves on top of
//! the authoritative state and lands exactly where the server will.
//!
//! Units: positions and displacements are in world units (100 per meter),
//! velocity in m/s, mass in kg, forces in newtons.

use serde::{Deserialize, Serialize};

use crate::{
    math::{Quat, Transform, Vec3},
    world::CollisionWorld,
};

/// World units per meter.
pub const UNITS_PER_METER: f32 = 100.0;

/// One tick of player intent. Immutable once created.
///
/// `timestamp` is a monotonically non-decreasing sample of the shared
/// simulation clock taken at creation; it is the sole ordering key for
/// acknowledgment and queue pruning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Move {
    /// Simulated duration in seconds. Validated > 0 before it gets here.
    pub delta_time: f32,
    /// Drive input in [-1, 1].
    pub throttle: f32,
    /// Steering input in [-1, 1].
    pub steering: f32,
    /// Simulation clock sample at creation, seconds.
    pub timestamp: f64,
}

/// Authoritative belief about one kart.
///
/// Owned exclusively by the authority; viewers hold read-only copies
/// delivered over the wire. `last_move` doubles as the acknowledgment:
/// its timestamp tells the controlling client which predicted moves are
/// already baked in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct KartState {
    pub velocity: Vec3,
    pub last_move: Move,
    pub transform: Transform,
}

/// Static per-vehicle tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KartTuning {
    /// Mass in kg.
    #[serde(default = "default_mass")]
    pub mass: f32,
    /// Peak drive force in newtons.
    #[serde(default = "default_max_force")]
    pub max_force: f32,
    /// Minimum turning radius at full steering, in meters.
    #[serde(default = "default_min_turning_radius")]
    pub min_turning_radius: f32,
    /// Air resistance scale; higher is more drag.
    #[serde(default = "default_drag")]
    pub drag_coefficient: f32,
    /// Rolling resistance scale.
    #[serde(default = "default_rolling")]
    pub rolling_resistance_coefficient: f32,
}

fn default_mass() -> f32 {
    1000.0
}
fn default_max_force() -> f32 {
    5000.0
}
fn default_min_turning_radius() -> f32 {
    8.0
}
fn default_drag() -> f32 {
    16.0
}
fn default_rolling() -> f32 {
    0.015
}

impl Default for KartTuning {
    fn default() -> Self {
        Self {
            mass: default_mass(),
            max_force: default_max_force(),
            min_turning_radius: default_min_turning_radius(),
            drag_coefficient: default_drag(),
            rolling_resistance_coefficient: default_rolling(),
        }
    }
}

/// Which part an instance plays for a given kart.
///
/// Chosen once at spawn from network-role information; there are no
/// transitions at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Allowed to produce canonical state.
    Authority,
    /// Receives live input and predicts locally.
    ControllingClient,
    /// Only displays the kart; never simulates it.
    RemoteViewer,
}

/// Advances one kart by one move. Pure and deterministic.
///
/// `delta_time <= 0` is rejected upstream and never reaches this function.
pub fn simulate_move(
    transform: Transform,
    velocity: Vec3,
    mv: &Move,
    tuning: &KartTuning,
    world: &dyn CollisionWorld,
) -> (Transform, Vec3) {
    let forward = transform.forward();

    let mut force = forward * tuning.max_force * mv.throttle;
    force += air_resistance(velocity, tuning);
    force += rolling_resistance(velocity, tuning, world.gravity_magnitude());

    let acceleration = force * (1.0 / tuning.mass);
    let mut velocity = velocity + acceleration * mv.delta_time;

    // Steering rotates both the orientation and the velocity about the up
    // axis, scaled by distance traveled along the forward direction.
    let travel = forward.dot(velocity) * mv.delta_time;
    let angle = travel / tuning.min_turning_radius * mv.steering;
    let turn = Quat::from_axis_angle(transform.up(), angle);
    velocity = turn.rotate(velocity);
    let rotation = turn.mul(transform.rotation).normalized();

    let displacement = velocity * (UNITS_PER_METER * mv.delta_time);
    let mut position = transform.position + displacement;
    if let Some(contact) = world.cast_movement(transform.position, displacement) {
        position = contact;
        velocity = Vec3::ZERO;
    }

    (Transform::new(position, rotation), velocity)
}

fn air_resistance(velocity: Vec3, tuning: &KartTuning) -> Vec3 {
    -velocity.normalized_or_zero() * velocity.len_sq() * tuning.drag_coefficient
}

fn rolling_resistance(velocity: Vec3, tuning: &KartTuning, gravity: f32) -> Vec3 {
    let normal_force = tuning.mass * gravity;
    -velocity.normalized_or_zero() * tuning.rolling_resistance_coefficient * normal_force
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{FlatGround, WallAt};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn full_throttle(dt: f32, t: f64) -> Move {
        Move {
            delta_time: dt,
            throttle: 1.0,
            steering: 0.0,
            timestamp: t,
        }
    }

    #[test]
    fn step_is_bit_identical() {
        let world = FlatGround::default();
        let tuning = KartTuning::default();
        let transform = Transform::default();
        let velocity = Vec3::new(3.0, 1.0, 0.0);
        let mv = Move {
            delta_time: 0.016,
            throttle: 0.7,
            steering: -0.3,
            timestamp: 1.5,
        };

        let a = simulate_move(transform, velocity, &mv, &tuning, &world);
        let b = simulate_move(transform, velocity, &mv, &tuning, &world);
        assert_eq!(a, b);
    }

    #[test]
    fn random_move_sequences_replay_identically() {
        let world = FlatGround::default();
        let tuning = KartTuning::default();
        let mut rng = StdRng::seed_from_u64(0x6b617274);

        let moves: Vec<Move> = (0..200)
            .map(|i| Move {
                delta_time: rng.gen_range(0.001..0.05),
                throttle: rng.gen_range(-1.0..1.0),
                steering: rng.gen_range(-1.0..1.0),
                timestamp: i as f64 * 0.05,
            })
            .collect();

        let run = |moves: &[Move]| {
            let mut t = Transform::default();
            let mut v = Vec3::ZERO;
            for mv in moves {
                let (nt, nv) = simulate_move(t, v, mv, &tuning, &world);
                t = nt;
                v = nv;
            }
            (t, v)
        };

        assert_eq!(run(&moves), run(&moves));
    }

    #[test]
    fn kart_at_rest_stays_finite() {
        let world = FlatGround::default();
        let tuning = KartTuning::default();
        let mv = Move {
            delta_time: 0.1,
            throttle: 0.0,
            steering: 0.0,
            timestamp: 0.0,
        };
        let (t, v) = simulate_move(Transform::default(), Vec3::ZERO, &mv, &tuning, &world);
        assert!(v.len().is_finite());
        assert!(t.position.len().is_finite());
        assert_eq!(v, Vec3::ZERO);
    }

    /// From rest at full throttle, speed climbs every step and converges
    /// toward the terminal velocity where drive force equals resistance.
    #[test]
    fn full_throttle_approaches_terminal_velocity() {
        let world = FlatGround::default();
        let tuning = KartTuning::default();
        let mut transform = Transform::default();
        let mut velocity = Vec3::ZERO;

        let rolling =
            tuning.rolling_resistance_coefficient * tuning.mass * world.gravity_magnitude();
        let terminal = ((tuning.max_force - rolling) / tuning.drag_coefficient).sqrt();

        let mut prev_speed = 0.0f32;
        for i in 0..500 {
            let (t, v) = simulate_move(
                transform,
                velocity,
                &full_throttle(0.1, i as f64 * 0.1),
                &tuning,
                &world,
            );
            transform = t;
            velocity = v;

            let speed = velocity.len();
            // Non-strict: near terminal the per-step gain drops below one ulp.
            assert!(speed >= prev_speed, "speed must never drop");
            assert!(speed < terminal + 0.1);
            prev_speed = speed;
        }

        assert!(prev_speed > terminal * 0.95, "should be near terminal");
    }

    #[test]
    fn steering_turns_orientation_and_velocity() {
        let world = FlatGround::default();
        let tuning = KartTuning::default();
        let mut transform = Transform::default();
        let mut velocity = Vec3::new(10.0, 0.0, 0.0);

        for i in 0..10 {
            let mv = Move {
                delta_time: 0.1,
                throttle: 0.5,
                steering: 1.0,
                timestamp: i as f64 * 0.1,
            };
            let (t, v) = simulate_move(transform, velocity, &mv, &tuning, &world);
            transform = t;
            velocity = v;
        }

        // A left crank at speed must have bent the heading off the x axis.
        assert!(transform.forward().y.abs() > 0.1);
        assert!(velocity.y.abs() > 0.1);
    }

    #[test]
    fn blocking_hit_clamps_position_and_zeroes_velocity() {
        let world = WallAt::new(50.0);
        let tuning = KartTuning::default();
        let transform = Transform::default();
        let velocity = Vec3::new(20.0, 0.0, 0.0);

        // 20 m/s over 0.1 s is 200 units of displacement, through the wall.
        let (t, v) = simulate_move(transform, velocity, &full_throttle(0.1, 0.0), &tuning, &world);
        assert!((t.position.x - 50.0).abs() < 1e-3);
        assert_eq!(v, Vec3::ZERO);
    }
}
