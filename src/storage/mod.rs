//! Content store for canonical post documents.
//!
//! This module contains:
//! - `PostStore` trait: create/read/delete/upsert of posts
//! - Storage configuration and factory
//! - Implementations: in-memory (always available), MongoDB (`mongodb` feature)

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;
mod post;

pub use memory::MemoryPostStore;
#[cfg(feature = "mongodb")]
pub use mongodb::MongoPostStore;
pub use post::Post;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Post has no id")]
    MissingId,

    #[error("Invalid post id: {0}")]
    InvalidId(String),

    #[error("Invalid timestamp: {0}ms")]
    InvalidTimestamp(i64),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] ::mongodb::error::Error),
}

/// Interface for post persistence.
///
/// Not-found is never an error: lookups return `None` or omit the id.
///
/// Implementations:
/// - `MemoryPostStore`: in-process map, for standalone mode and tests
/// - `MongoPostStore`: MongoDB collection
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Upsert a post.
    ///
    /// A post with an id replaces the stored document (inserting it if it
    /// no longer exists). A post without an id gets a fresh one.
    /// Returns the post as stored.
    async fn create(&self, post: Post) -> Result<Post>;

    /// Fetch a single post. Malformed ids are reported as not found.
    async fn get_by_id(&self, id: &str) -> Result<Option<Post>>;

    /// All posts by an author, unordered.
    async fn get_by_author(&self, author_id: i32) -> Result<Vec<Post>>;

    /// Posts for the given ids. Missing ids are silently dropped.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Post>>;

    /// Delete a post by its id.
    async fn delete(&self, post: &Post) -> Result<()>;

    /// Create secondary indexes (author id). Idempotent.
    async fn ensure_indexes(&self) -> Result<()>;

    /// True if no posts are stored.
    async fn is_empty(&self) -> Result<bool>;

    /// Bulk insert, assigning ids to posts that have none.
    async fn create_many(&self, posts: Vec<Post>) -> Result<Vec<Post>>;

    /// Every stored post, unordered.
    async fn list_all(&self) -> Result<Vec<Post>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Content store type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-process store, lost on restart.
    #[default]
    Memory,
    /// MongoDB collection.
    Mongodb,
}

/// Content store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// MongoDB connection string.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Collection holding post documents.
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            uri: "mongodb://localhost:27017".to_string(),
            database: "postdex".to_string(),
            collection: "posts".to_string(),
        }
    }
}

/// Initialize the content store based on configuration.
pub async fn init_post_store(config: &StorageConfig) -> Result<Arc<dyn PostStore>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Content store initialized");
            Ok(Arc::new(MemoryPostStore::new()))
        }
        StorageType::Mongodb => {
            #[cfg(feature = "mongodb")]
            {
                let client = ::mongodb::Client::with_uri_str(&config.uri).await?;
                let store =
                    MongoPostStore::new(&client, &config.database, &config.collection);
                store.ensure_indexes().await?;
                info!(
                    storage_type = "mongodb",
                    database = %config.database,
                    collection = %config.collection,
                    "Content store initialized"
                );
                Ok(Arc::new(store))
            }

            #[cfg(not(feature = "mongodb"))]
            {
                Err(StorageError::Unavailable(
                    "MongoDB support requires the 'mongodb' feature. Rebuild with --features mongodb"
                        .to_string(),
                ))
            }
        }
    }
}
