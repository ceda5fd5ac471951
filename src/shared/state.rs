use crate::config::AppConfig;
use crate::outbound::EmailTransport;
use crate::shared::utils::DbPool;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub transport: Arc<dyn EmailTransport>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}
