//! Configuration system.
//!
//! Loads engine configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

use crate::sim::KartTuning;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Per-vehicle physics tuning.
    #[serde(default)]
    pub tuning: KartTuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 64,
            tuning: KartTuning::default(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_tuning_defaults() {
        let cfg =
            EngineConfig::from_json_str(r#"{"server_addr":"127.0.0.1:1234","tick_hz":32}"#)
                .unwrap();
        assert_eq!(cfg.tick_hz, 32);
        assert_eq!(cfg.tuning.mass, 1000.0);
        assert_eq!(cfg.tuning.max_force, 5000.0);
    }
}
