//! `kart_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - A deterministic simulation step both sides can replay.
//! - Clear separation of concerns (math, sim, net, world, config, render).
//! - Traits at the seams the surrounding engine fills in (world queries,
//!   render attachment).
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod render;
pub mod sim;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::sim::*;
    pub use crate::world::*;
}
