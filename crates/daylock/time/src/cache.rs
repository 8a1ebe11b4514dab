//! Durable persistence of the last known time snapshot.

use std::sync::Arc;

use daylock_storage::{get_json, set_json, KeyValueStore};

use crate::error::Result;
use crate::model::TimeCache;

/// Reads and writes the single [`TimeCache`] blob under a fixed key.
#[derive(Clone)]
pub struct TimeCacheStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl TimeCacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn load(&self) -> Result<Option<TimeCache>> {
        Ok(get_json(self.store.as_ref(), &self.key).await?)
    }

    pub async fn save(&self, cache: &TimeCache) -> Result<()> {
        Ok(set_json(self.store.as_ref(), &self.key, cache).await?)
    }
}

impl std::fmt::Debug for TimeCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeCacheStore")
            .field("key", &self.key)
            .finish()
    }
}
