//! Shared application state handed to every handler.

use std::sync::Arc;

use misir_core::{ConfigHandle, SqliteStore, SystemConfig};

#[cfg(feature = "embeddings")]
use misir_core::EmbeddingService;

pub struct AppState {
    pub store: SqliteStore,
    pub config: ConfigHandle,
    #[cfg(feature = "embeddings")]
    pub embeddings: EmbeddingService,
    pub webhook_client: reqwest::Client,
}

impl AppState {
    pub fn system_config(&self) -> Arc<SystemConfig> {
        self.config.current()
    }
}

pub type SharedState = Arc<AppState>;
