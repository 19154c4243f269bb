use crate::config::ServerConfig;
use crate::notify::Notifier;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<ServerConfig>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    pub fn new(pool: PgPool, config: ServerConfig, notifier: Notifier) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            notifier: Arc::new(notifier),
        }
    }
}
