//! Move validation.
//!
//! The authority trusts the transport's identity of "which client sent
//! this" but nothing about the move itself. A client that lies about its
//! inputs gets its move dropped with no state change and no reply; the
//! next accepted snapshot corrects it.
//!
//! The speed guard: the sum of accepted `delta_time`s plus the incoming
//! one must stay strictly below the wall-clock age of the session. A
//! client compressing time to move faster runs ahead of that bound.

use kart_shared::sim::Move;

/// Why a move was dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reject {
    /// Throttle or steering outside [-1, 1], or not finite.
    OutOfRange { field: &'static str, value: f32 },
    /// Simulated duration must be finite and strictly positive.
    BadDeltaTime { delta_time: f32 },
    /// Timestamps must strictly increase per connection.
    NonMonotonicTimestamp { timestamp: f64, last: f64 },
    /// Cumulative simulated time would reach or pass the wall clock.
    SpeedGuard { proposed: f64, wall_clock: f64 },
}

/// Per-kart validation state on the authority.
#[derive(Debug, Default)]
pub struct MoveValidator {
    cumulative_sim_time: f64,
    last_timestamp: Option<f64>,
}

impl MoveValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total simulated time accepted so far, seconds.
    pub fn cumulative_sim_time(&self) -> f64 {
        self.cumulative_sim_time
    }

    /// Checks a move against the declared ranges and the speed guard.
    ///
    /// `wall_clock` is the session age in seconds, supplied by the caller
    /// so tests can pin it. Rejection leaves the validator untouched;
    /// acceptance advances the cumulative simulated time.
    pub fn validate(&mut self, mv: &Move, wall_clock: f64) -> Result<(), Reject> {
        if !mv.delta_time.is_finite() || mv.delta_time <= 0.0 {
            return Err(Reject::BadDeltaTime {
                delta_time: mv.delta_time,
            });
        }
        if !mv.throttle.is_finite() || mv.throttle.abs() > 1.0 {
            return Err(Reject::OutOfRange {
                field: "throttle",
                value: mv.throttle,
            });
        }
        if !mv.steering.is_finite() || mv.steering.abs() > 1.0 {
            return Err(Reject::OutOfRange {
                field: "steering",
                value: mv.steering,
            });
        }

        let last = self.last_timestamp.unwrap_or(f64::NEG_INFINITY);
        if !mv.timestamp.is_finite() || mv.timestamp <= last {
            return Err(Reject::NonMonotonicTimestamp {
                timestamp: mv.timestamp,
                last,
            });
        }

        let proposed = self.cumulative_sim_time + f64::from(mv.delta_time);
        if proposed >= wall_clock {
            return Err(Reject::SpeedGuard {
                proposed,
                wall_clock,
            });
        }

        self.cumulative_sim_time = proposed;
        self.last_timestamp = Some(mv.timestamp);
        Ok(())
    }
}
