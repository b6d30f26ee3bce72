//! In-memory user directory for standalone mode and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Result, User, UserDirectory, UserStoreError};

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<i32, User>>,
    fail_on_read: RwLock<bool>,
    lookups: RwLock<usize>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory holding `users`.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.user_id, u)).collect()),
            ..Self::default()
        }
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.user_id, user);
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Number of batch lookups served so far.
    pub async fn lookup_count(&self) -> usize {
        *self.lookups.read().await
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>> {
        if *self.fail_on_read.read().await {
            return Err(UserStoreError::Unavailable("Mock read failure".to_string()));
        }
        *self.lookups.write().await += 1;

        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}
