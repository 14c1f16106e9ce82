use crate::config::AppConfig;
use crate::notifications::NotificationSink;
use crate::shared::utils::DbPool;
use std::sync::Arc;

/// Shared application state handed to every axum handler and to the
/// background SLA sweep.
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            conn,
            config,
            notifier,
        }
    }
}
