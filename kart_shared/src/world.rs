//! World abstraction.
//!
//! The simulation step never owns level geometry. It asks the world for the
//! local gravity and for blocking hits along a displacement, and nothing
//! else. Whatever loaded the level implements this trait.

use crate::math::Vec3;

/// Gravity and collision queries supplied by the surrounding world.
pub trait CollisionWorld: Send + Sync {
    /// Magnitude of gravitational acceleration in m/s².
    fn gravity_magnitude(&self) -> f32;

    /// Sweeps from `from` along `displacement` (world units).
    ///
    /// Returns the contact point of the first blocking hit, or `None` when
    /// the full displacement is free.
    fn cast_movement(&self, from: Vec3, displacement: Vec3) -> Option<Vec3>;
}

/// Unobstructed flat ground with standard gravity.
#[derive(Debug, Clone, Copy)]
pub struct FlatGround {
    pub gravity: f32,
}

impl Default for FlatGround {
    fn default() -> Self {
        Self { gravity: 9.81 }
    }
}

impl CollisionWorld for FlatGround {
    fn gravity_magnitude(&self) -> f32 {
        self.gravity
    }

    fn cast_movement(&self, _from: Vec3, _displacement: Vec3) -> Option<Vec3> {
        None
    }
}

/// World with a solid wall at `x = wall_x`, blocking travel in +x.
///
/// Just enough geometry to exercise the blocking-hit path in tests.
#[derive(Debug, Clone, Copy)]
pub struct WallAt {
    pub wall_x: f32,
    pub gravity: f32,
}

impl WallAt {
    pub fn new(wall_x: f32) -> Self {
        Self {
            wall_x,
            gravity: 9.81,
        }
    }
}

impl CollisionWorld for WallAt {
    fn gravity_magnitude(&self) -> f32 {
        self.gravity
    }

    fn cast_movement(&self, from: Vec3, displacement: Vec3) -> Option<Vec3> {
        let to_x = from.x + displacement.x;
        if from.x < self.wall_x && to_x >= self.wall_x {
            let t = (self.wall_x - from.x) / displacement.x;
            Some(from + displacement * t)
        } else {
            None
        }
    }
}
