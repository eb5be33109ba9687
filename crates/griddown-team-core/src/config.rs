//! Engine configuration

use serde::Deserialize;

use crate::crypto::{PassphraseCipher, DEFAULT_KDF_ITERATIONS};
use crate::types::{ACTIVE_WINDOW_MS, MAX_RALLY_POINTS, STALE_WINDOW_MS};

/// Settings-store key holding the persisted team snapshot
pub const DEFAULT_STATE_KEY: &str = "griddown_team";

/// Tunables for a [`TeamEngine`](crate::TeamEngine).
///
/// The defaults match what every peer on the mesh expects; only tests and
/// benches should lower `kdf_iterations`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_rally_points: usize,
    pub kdf_iterations: u32,
    pub active_window_ms: i64,
    pub stale_window_ms: i64,
    pub state_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rally_points: MAX_RALLY_POINTS,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            active_window_ms: ACTIVE_WINDOW_MS,
            stale_window_ms: STALE_WINDOW_MS,
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Override the KDF cost (builder pattern)
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Override the settings-store key (builder pattern)
    pub fn with_state_key(mut self, key: impl Into<String>) -> Self {
        self.state_key = key.into();
        self
    }

    pub fn cipher(&self) -> PassphraseCipher {
        PassphraseCipher::with_iterations(self.kdf_iterations)
    }
}
