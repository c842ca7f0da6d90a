//! Engine configuration.
//!
//! [`EngineConfig`] is deserialized from JSON. Every field defaults sensibly
//! so a completely empty `{}` file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Error;

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long the shutdown wrapper waits for a cancelled run to finish.
    pub shutdown_grace_ms: u64,
    /// `tracing-subscriber` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Policy bit names applied to the initial state
    /// (`"continue"`, `"log"`, `"skip_rollback"`).
    pub policy: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 3000,
            log_filter: "info".to_string(),
            policy: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Deserialize an `EngineConfig` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// The shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
