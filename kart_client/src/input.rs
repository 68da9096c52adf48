//! Input handling.
//!
//! In a real build this would integrate with windowing, raw devices, and
//! action bindings. Here the concern is producing deterministic per-tick
//! `Move`s: sampled input + elapsed time + a simulation clock stamp.

use kart_shared::sim::Move;

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    /// Drive input, clamped into [-1, 1] at move creation.
    pub throttle: f32,
    /// Steering input, clamped into [-1, 1] at move creation.
    pub steering: f32,
}

/// Turns sampled input into a `Move` for one tick.
///
/// `now` is the shared simulation clock; callers must pass non-decreasing
/// values, it is the move's ordering key.
pub fn build_move(input: InputState, delta_time: f32, now: f64) -> Move {
    Move {
        delta_time,
        throttle: input.throttle.clamp(-1.0, 1.0),
        steering: input.steering.clamp(-1.0, 1.0),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_are_clamped_to_declared_range() {
        let mv = build_move(
            InputState {
                throttle: 3.0,
                steering: -7.0,
            },
            0.016,
            1.0,
        );
        assert_eq!(mv.throttle, 1.0);
        assert_eq!(mv.steering, -1.0);
    }

    #[test]
    fn move_carries_clock_sample() {
        let mv = build_move(InputState::default(), 0.016, 42.5);
        assert_eq!(mv.timestamp, 42.5);
        assert_eq!(mv.delta_time, 0.016);
    }
}
