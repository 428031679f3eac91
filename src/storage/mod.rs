//! Persistent key-value storage.
//!
//! Holds the serialized auth session and the theme preference. The SQLite
//! backend is what the app uses; the in-memory one is for tests and for
//! running without a writable data directory.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::AppError;

/// String-keyed persistent storage, modelled on the mobile async storage API.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove_item(&self, key: &str) -> Result<(), AppError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), AppError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}
