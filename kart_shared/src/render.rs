//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend. The
//! protocol only ever *writes* a transform to whatever displays the kart;
//! it never reads it back except to seed a viewer's spline start point,
//! and that read comes from its own tracked copy.

use std::sync::{Arc, Mutex};

use crate::math::{Quat, Vec3};

/// Opaque sink that moves the visible mesh.
pub trait RenderTarget: Send {
    fn set_position(&mut self, position: Vec3);
    fn set_rotation(&mut self, rotation: Quat);
}

/// A no-op target useful for headless runs.
#[derive(Default)]
pub struct NullRender;

impl RenderTarget for NullRender {
    fn set_position(&mut self, _position: Vec3) {}
    fn set_rotation(&mut self, _rotation: Quat) {}
}

/// Records every write for assertions in tests.
///
/// Clones share the same buffer, so a test can attach one handle as a
/// target and keep another to read the writes back.
#[derive(Default, Clone)]
pub struct RecordingRender {
    writes: Arc<Mutex<Writes>>,
}

#[derive(Default)]
struct Writes {
    positions: Vec<Vec3>,
    rotations: Vec<Quat>,
}

impl RecordingRender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.writes
            .lock()
            .map(|w| w.positions.clone())
            .unwrap_or_default()
    }

    pub fn rotations(&self) -> Vec<Quat> {
        self.writes
            .lock()
            .map(|w| w.rotations.clone())
            .unwrap_or_default()
    }
}

impl RenderTarget for RecordingRender {
    fn set_position(&mut self, position: Vec3) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.positions.push(position);
        }
    }

    fn set_rotation(&mut self, rotation: Quat) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.rotations.push(rotation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_render_shares_writes_across_clones() {
        let render = RecordingRender::new();
        let mut target: Box<dyn RenderTarget> = Box::new(render.clone());

        target.set_position(Vec3::new(1.0, 2.0, 3.0));
        target.set_rotation(Quat::IDENTITY);
        target.set_position(Vec3::new(4.0, 5.0, 6.0));

        assert_eq!(
            render.positions(),
            vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)]
        );
        assert_eq!(render.rotations(), vec![Quat::IDENTITY]);
    }

    #[test]
    fn null_render_accepts_writes() {
        let mut render = NullRender;
        render.set_position(Vec3::ZERO);
        render.set_rotation(Quat::IDENTITY);
    }
}
