//! Application context passed to every service function.

use std::sync::Arc;

use anyhow::Result;
use brainstore_core::embedding::Embedder;
use brainstore_core::store::memory::InMemoryStore;
use brainstore_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Configuration plus the two collaborators every flow needs.
///
/// Cheap to clone; the HTTP server keeps one in its router state.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub embedder: Arc<dyn Embedder>,
}

impl AppContext {
    pub fn new(config: Config, store: Arc<dyn Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            embedder,
        }
    }

    /// Open the SQLite database named in `config`, apply migrations, and
    /// build the configured embedder.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::migrate_pool(&pool).await?;
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(
            config,
            Arc::new(SqliteStore::new(pool)),
            embedder,
        ))
    }

    /// Context over an [`InMemoryStore`].
    pub fn in_memory(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(config, Arc::new(InMemoryStore::new()), embedder)
    }
}
