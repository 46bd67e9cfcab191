pub mod bill_mapping_repository;
pub mod commission_repository;
pub mod driver_directory;
pub mod error;
pub mod firebase;
pub mod keys;
pub mod memory;
pub mod payment_record_repository;
pub mod processed_callback_repository;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use self::error::DatabaseResult;
use self::firebase::FirebaseStore;
use self::memory::MemoryStore;
use crate::config::{secret_preview, StoreConfig};

/// Tree-structured JSON document store.
///
/// Paths are slash-separated (`bill_mappings/rp123`). There are no
/// transactions: `put` replaces a node, `patch` shallow-merges into it and
/// `push` appends a child under a generated, time-ordered key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `None` when the node is absent or the store answered with something
    /// that is not JSON.
    async fn get(&self, path: &str) -> DatabaseResult<Option<JsonValue>>;

    async fn put(&self, path: &str, value: &JsonValue) -> DatabaseResult<()>;

    async fn patch(&self, path: &str, fields: &JsonValue) -> DatabaseResult<()>;

    /// Returns the generated child key
    async fn push(&self, path: &str, value: &JsonValue) -> DatabaseResult<String>;

    async fn delete(&self, path: &str) -> DatabaseResult<()>;

    /// Keys of the direct children of a node, sorted
    async fn child_keys(&self, path: &str) -> DatabaseResult<Vec<String>>;

    /// Compare-and-set write. `Ok(false)` when the node already holds a value.
    async fn put_if_absent(&self, path: &str, value: &JsonValue) -> DatabaseResult<bool>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Connect to the remote store described by `config`
pub fn init_store(config: &StoreConfig) -> DatabaseResult<SharedStore> {
    info!(
        database_url = %config.database_url,
        auth = %config.database_secret.as_deref().map(secret_preview).unwrap_or_else(|| "none".to_string()),
        timeout_secs = config.timeout_secs,
        "Initializing document store client"
    );

    let store = FirebaseStore::new(
        &config.database_url,
        config.database_secret.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;

    info!("Document store client initialized successfully");
    Ok(Arc::new(store))
}

/// In-process store for local runs with `SKIP_EXTERNALS`
pub fn init_memory_store() -> SharedStore {
    info!("Using in-memory document store");
    Arc::new(MemoryStore::new())
}

pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
