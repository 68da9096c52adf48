//! `kart_client`
//!
//! Client-side systems:
//! - Connection management over the reliable, ordered channel
//! - Input capture and move generation
//! - Prediction and reconciliation for the controlled kart
//! - Hermite interpolation for remote karts
//! - Render attachment wiring

pub mod client;
pub mod input;
pub mod interp;
pub mod predict;

pub use client::GameClient;
