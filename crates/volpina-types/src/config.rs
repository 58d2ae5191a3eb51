//! Service configuration types for Volpina.
//!
//! `ServiceConfig` represents `config.toml` in the data directory. It controls
//! the retention cap, the store location, and the listen address.

use serde::{Deserialize, Serialize};

/// Default number of unsaved messages kept per conversation.
pub const DEFAULT_RETENTION_CAP: usize = 20;

/// Top-level configuration for the Volpina service.
///
/// Loaded from `~/.volpina/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Maximum unsaved messages retained per conversation (K).
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,

    /// Store URL. `None` means `{data_dir}/volpina.db`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Address the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_retention_cap() -> usize {
    DEFAULT_RETENTION_CAP
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
            database_url: None,
            host: default_host(),
            port: default_port(),
        }
    }
}
