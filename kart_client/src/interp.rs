//! Interpolation for remote karts.
//!
//! Remote viewers never run the simulation step. Each authoritative update
//! opens a fresh Hermite segment from the currently *rendered* transform to
//! the new authoritative one; ticks in between walk the segment. Starting
//! from the rendered position rather than the previous authoritative one
//! absorbs render/authority drift without a visible pop.

use kart_shared::{
    math::{Quat, Transform, Vec3},
    sim::{KartState, UNITS_PER_METER},
};

/// Intervals shorter than this are treated as "no previous snapshot".
const MIN_INTERVAL: f32 = 1e-4;

/// Cubic Hermite segment between two authoritative updates.
///
/// Derivatives are velocities scaled by the interval duration (and the
/// meters-to-units factor), so the curve leaves the start point at the old
/// velocity and arrives at the new one.
#[derive(Debug, Clone, Copy)]
pub struct HermiteSpline {
    pub start_location: Vec3,
    pub target_location: Vec3,
    pub start_derivative: Vec3,
    pub target_derivative: Vec3,
}

impl HermiteSpline {
    /// Position at `t`. Exact at the endpoints; `t` outside [0, 1]
    /// extrapolates.
    pub fn interpolate_location(&self, t: f32) -> Vec3 {
        let t2 = t * t;
        let t3 = t2 * t;
        self.start_location * (2.0 * t3 - 3.0 * t2 + 1.0)
            + self.start_derivative * (t3 - 2.0 * t2 + t)
            + self.target_location * (-2.0 * t3 + 3.0 * t2)
            + self.target_derivative * (t3 - t2)
    }

    /// Derivative at `t`, in the same scaled units as the endpoints'.
    pub fn interpolate_derivative(&self, t: f32) -> Vec3 {
        let t2 = t * t;
        self.start_location * (6.0 * t2 - 6.0 * t)
            + self.start_derivative * (3.0 * t2 - 4.0 * t + 1.0)
            + self.target_location * (-6.0 * t2 + 6.0 * t)
            + self.target_derivative * (3.0 * t2 - 2.0 * t)
    }
}

/// Smooths a remote kart between discrete authoritative updates.
#[derive(Default)]
pub struct Interpolator {
    latest: Option<KartState>,
    time_since_update: f32,
    time_between_updates: f32,
    start_transform: Transform,
    start_velocity: Vec3,
    rendered: Transform,
    velocity: Vec3,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Velocity estimate fed back into the next segment's start derivative.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn rendered(&self) -> Transform {
        self.rendered
    }

    /// Applies a new authoritative snapshot: record the interval, reset the
    /// elapsed clock, and anchor the next segment at the rendered state.
    pub fn on_state_update(&mut self, state: &KartState) {
        self.time_between_updates = self.time_since_update;
        self.time_since_update = 0.0;
        self.start_transform = self.rendered;
        self.start_velocity = self.velocity;
        self.latest = Some(*state);
    }

    /// Advances the viewer clock and produces the next rendered state.
    ///
    /// Returns `None` until the first snapshot arrives. A ~zero interval
    /// (first snapshot ever) snaps directly to the authoritative state.
    /// Otherwise the lerp ratio is deliberately unclamped: a late snapshot
    /// pushes it past 1 and the curve extrapolates mildly.
    pub fn tick(&mut self, delta_time: f32) -> Option<(Vec3, Quat, Vec3)> {
        let state = self.latest?;
        self.time_since_update += delta_time;

        if self.time_between_updates < MIN_INTERVAL {
            self.rendered = state.transform;
            self.velocity = state.velocity;
            return Some((state.transform.position, state.transform.rotation, state.velocity));
        }

        let ratio = self.time_since_update / self.time_between_updates;
        let velocity_to_derivative = self.time_between_updates * UNITS_PER_METER;

        let spline = HermiteSpline {
            start_location: self.start_transform.position,
            target_location: state.transform.position,
            start_derivative: self.start_velocity * velocity_to_derivative,
            target_derivative: state.velocity * velocity_to_derivative,
        };

        let position = spline.interpolate_location(ratio);
        let velocity = spline.interpolate_derivative(ratio) * (1.0 / velocity_to_derivative);
        let rotation = self
            .start_transform
            .rotation
            .slerp(state.transform.rotation, ratio);

        self.rendered = Transform::new(position, rotation);
        self.velocity = velocity;
        Some((position, rotation, velocity))
    }
}
