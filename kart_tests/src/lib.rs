//! Integration tests for the kart netcode stack.
//!
//! The crate body is empty; everything lives under `tests/`, which runs
//! real client and server instances over loopback sockets.
