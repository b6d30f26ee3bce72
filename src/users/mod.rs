//! Relational user directory.
//!
//! Read-only batch lookup of user records, used to join leaderboard author
//! ids back to names and emails. The users table itself is owned elsewhere;
//! `init`/`insert` exist for local development and fixtures.
//!
//! Implementations: in-memory (always available), SQLite (`sqlite` feature),
//! PostgreSQL (`postgres` feature).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryUserDirectory;
#[cfg(feature = "postgres")]
pub use postgres::PostgresUserDirectory;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteUserDirectory;

/// Result type for user lookups.
pub type Result<T> = std::result::Result<T, UserStoreError>;

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User store unavailable: {0}")]
    Unavailable(String),
}

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: i32,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(user_id: i32, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Batch lookup of users by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users whose id is in `ids`, unordered. Unknown ids are omitted.
    async fn get_users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// User store type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsersType {
    #[default]
    Memory,
    Sqlite,
    Postgres,
}

/// User store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    #[serde(rename = "type")]
    pub users_type: UsersType,
    /// Database connection URL.
    pub url: String,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            users_type: UsersType::Memory,
            url: "sqlite::memory:".to_string(),
        }
    }
}

/// Initialize the user directory based on configuration.
pub async fn init_user_directory(config: &UsersConfig) -> Result<Arc<dyn UserDirectory>> {
    match config.users_type {
        UsersType::Memory => {
            info!(users_type = "memory", "User directory initialized");
            Ok(Arc::new(MemoryUserDirectory::new()))
        }
        UsersType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                // Every in-memory connection is a separate database.
                let max_connections = if config.url.contains(":memory:") { 1 } else { 5 };
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(&config.url)
                    .await?;
                let directory = SqliteUserDirectory::new(pool);
                directory.init().await?;
                info!(users_type = "sqlite", "User directory initialized");
                Ok(Arc::new(directory))
            }

            #[cfg(not(feature = "sqlite"))]
            {
                Err(UserStoreError::Unavailable(
                    "SQLite support requires the 'sqlite' feature. Rebuild with --features sqlite"
                        .to_string(),
                ))
            }
        }
        UsersType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let pool = sqlx::PgPool::connect(&config.url).await?;
                info!(users_type = "postgres", "User directory initialized");
                Ok(Arc::new(PostgresUserDirectory::new(pool)))
            }

            #[cfg(not(feature = "postgres"))]
            {
                Err(UserStoreError::Unavailable(
                    "PostgreSQL support requires the 'postgres' feature. Rebuild with --features postgres"
                        .to_string(),
                ))
            }
        }
    }
}
