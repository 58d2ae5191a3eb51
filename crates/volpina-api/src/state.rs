//! Application state wiring the store and message service together.
//!
//! AppState holds the concrete service instance used by both the CLI and the
//! HTTP API. `MessageService` is generic over its store; AppState pins it to
//! the SQLite implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use volpina_core::retention::RetentionPolicy;
use volpina_core::service::message::MessageService;
use volpina_infra::config::{
    apply_env_overrides, load_service_config, resolve_data_dir, resolve_database_url,
};
use volpina_infra::sqlite::message::SqliteConversationStore;
use volpina_infra::sqlite::pool::DatabasePool;
use volpina_types::config::ServiceConfig;

/// Concrete type alias for the service generic pinned to the infra store.
pub type ConcreteMessageService = MessageService<SqliteConversationStore>;

/// Shared application state.
///
/// Cloned into every request handler; the only shared resource is the
/// database pool behind the service.
#[derive(Clone)]
pub struct AppState {
    pub message_service: Arc<ConcreteMessageService>,
    pub config: Arc<ServiceConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire the service.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config = apply_env_overrides(load_service_config(&data_dir).await);
        let database_url = resolve_database_url(&config, &data_dir);

        Self::connect(&database_url, config, data_dir).await
    }

    /// Open the store at `database_url` and wire the service with `config`.
    pub async fn connect(
        database_url: &str,
        config: ServiceConfig,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(database_url)
            .await
            .context("failed to open message store")?;

        let policy = RetentionPolicy::new(config.retention_cap);
        if policy.cap() != config.retention_cap {
            tracing::warn!(
                configured = config.retention_cap,
                effective = policy.cap(),
                "retention_cap below minimum, raised"
            );
        }

        let store = SqliteConversationStore::new(db_pool.clone());
        let message_service = MessageService::new(store, policy);

        Ok(Self {
            message_service: Arc::new(message_service),
            config: Arc::new(config),
            data_dir,
            db_pool,
        })
    }
}
