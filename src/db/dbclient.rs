use std::sync::Arc;

use evlog::meta;

use crate::config::Config;
use crate::db::embedded::EmbeddedStorage;
use crate::db::error::StorageError;
use crate::db::postgres::PostgresStorage;
use crate::db::Storage;
use crate::runtime::get_logger;

/// Handle to the storage backend chosen for this process.
///
/// Cloning is cheap; every clone shares the same backend.
#[derive(Clone)]
pub struct DBClient {
    storage: Arc<dyn Storage>,
}

impl DBClient {
    /// Picks the backend from `config` and prepares its schema.
    ///
    /// A configured database URL always means PostgreSQL: if the server is
    /// unreachable this fails rather than falling back to the embedded engine.
    pub async fn connect(config: &Config) -> Result<Self, StorageError> {
        let storage: Arc<dyn Storage> = match &config.database_url {
            Some(url) => Arc::new(PostgresStorage::connect(url, config.max_connections, config.connect_timeout).await?),
            None => Arc::new(EmbeddedStorage::open(&config.db_path).await?),
        };

        get_logger().info("Storage initialized.", meta! {
            "Backend" => storage.backend(),
        });

        Ok(Self { storage })
    }

    pub fn from_storage(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Throwaway embedded database, for tests and dry runs.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_storage(EmbeddedStorage::in_memory().await?))
    }

    pub fn conn(&self) -> &dyn Storage {
        self.storage.as_ref()
    }
}
