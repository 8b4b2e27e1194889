use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::AppServicesError;
use crate::sessions::PracticeService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    practice: Arc<PracticeService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock, config))
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, config: EngineConfig) -> Self {
        let practice = Arc::new(PracticeService::from_storage(clock, &storage).with_config(config));
        Self { storage, practice }
    }

    #[must_use]
    pub fn practice(&self) -> Arc<PracticeService> {
        Arc::clone(&self.practice)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
