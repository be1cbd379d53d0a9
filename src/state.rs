use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connects to Postgres and applies pending migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = PgStore::connect(&config).await?;
        store.migrate().await?;
        Ok(Self::from_parts(Arc::new(store), Arc::new(config)))
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// In-memory state for tests.
    pub fn fake() -> Self {
        Self::from_parts(Arc::new(MemoryStore::new()), Arc::new(AppConfig::for_tests()))
    }
}
