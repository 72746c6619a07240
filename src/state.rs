use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::storage::MediaStorage;
use crate::utils::rate_limit::FixedWindowLimiter;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub storage: MediaStorage,
    pub login_limiter: Arc<FixedWindowLimiter>,
}
