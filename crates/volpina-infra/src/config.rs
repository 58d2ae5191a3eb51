//! Service configuration loader for Volpina.
//!
//! Reads `config.toml` from the data directory (`~/.volpina/` in production)
//! and deserializes it into [`ServiceConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed. `DATABASE_URL` and `PORT` from the
//! environment override the file.

use std::path::{Path, PathBuf};

use volpina_types::config::ServiceConfig;

use crate::sqlite::pool::database_url_for;

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `VOLPINA_DATA_DIR` environment variable
/// 2. `~/.volpina`
/// 3. `.volpina` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VOLPINA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".volpina");
    }

    PathBuf::from(".volpina")
}

/// Load service configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ServiceConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_service_config(data_dir: &Path) -> ServiceConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ServiceConfig::default()
        }
    }
}

/// Apply `DATABASE_URL` and `PORT` from the process environment.
pub fn apply_env_overrides(config: ServiceConfig) -> ServiceConfig {
    apply_overrides(
        config,
        std::env::var("DATABASE_URL").ok(),
        std::env::var("PORT").ok(),
    )
}

fn apply_overrides(
    mut config: ServiceConfig,
    database_url: Option<String>,
    port: Option<String>,
) -> ServiceConfig {
    if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
        config.database_url = Some(url);
    }

    if let Some(raw) = port {
        match raw.trim().parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => tracing::warn!("Ignoring invalid PORT value '{raw}'"),
        }
    }

    config
}

/// Resolve the store URL: the configured one, or the default file in `data_dir`.
pub fn resolve_database_url(config: &ServiceConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| database_url_for(data_dir))
}
