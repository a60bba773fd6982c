//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::llm::{LlmClient, LlmError};
use crate::services::MemoryStore;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Services are built per request from the
/// references handed out here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    llm: LlmClient,
    memory: MemoryStore,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the LLM client cannot be built from the config.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, LlmError> {
        let llm = LlmClient::new(&config.llm)?;
        let memory = MemoryStore::new(&config.memory);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                llm,
                memory,
            }),
        })
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the LLM client.
    #[must_use]
    pub fn llm(&self) -> &LlmClient {
        &self.inner.llm
    }

    /// Get a reference to the conversation memory store.
    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.inner.memory
    }
}
