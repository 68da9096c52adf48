//! `kart_server`
//!
//! The authoritative side:
//! - Accepts clients and assigns each a kart
//! - Validates inbound moves (ranges, monotonic timestamps, speed guard)
//! - Runs the canonical simulation and replicates state changes

pub mod server;
pub mod validation;

pub use server::GameServer;
