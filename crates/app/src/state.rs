//! Application state management

use std::sync::Arc;

use roombook_core::{AppConfig, Database, MemoryStore, Result, Storage, StorageBackend};
use roombook_net::Handler;
use tracing::info;

/// Everything the server needs, built from configuration
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Storage>,
    pub handler: Arc<Handler<dyn Storage>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let catalog = Arc::new(config.catalog()?);
        let store = open_store(&config)?;

        let handler = Arc::new(Handler::new(
            Arc::clone(&store),
            catalog,
            config.policy(),
            config.booking.session_hours,
        ));

        Ok(Self {
            config,
            store,
            handler,
        })
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn Storage>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage; bookings are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            let db_path = config.storage.resolved_path()?;

            // Ensure parent directory exists
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            info!(path = %db_path.display(), "Opening database");
            let db = Database::open(&db_path, config.storage.busy_timeout())?;
            Ok(Arc::new(db))
        }
    }
}
