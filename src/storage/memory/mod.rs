//! In-memory content store.
//!
//! Used in standalone mode and tests. Failure injection mirrors what a
//! flaky database looks like to callers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Post, PostStore, Result, StorageError};

/// In-memory post store keyed by generated id.
#[derive(Default)]
pub struct MemoryPostStore {
    posts: RwLock<HashMap<String, Post>>,
    fail_on_write: RwLock<bool>,
    fail_on_read: RwLock<bool>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("Mock read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, mut post: Post) -> Result<Post> {
        self.check_write().await?;
        let id = post.id.get_or_insert_with(Self::generate_id).clone();
        self.posts.write().await.insert(id, post.clone());
        Ok(post)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>> {
        self.check_read().await?;
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn get_by_author(&self, author_id: i32) -> Result<Vec<Post>> {
        self.check_read().await?;
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Post>> {
        self.check_read().await?;
        let posts = self.posts.read().await;
        Ok(ids.iter().filter_map(|id| posts.get(id).cloned()).collect())
    }

    async fn delete(&self, post: &Post) -> Result<()> {
        self.check_write().await?;
        let id = post.id.as_deref().ok_or(StorageError::MissingId)?;
        self.posts.write().await.remove(id);
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool> {
        self.check_read().await?;
        Ok(self.posts.read().await.is_empty())
    }

    async fn create_many(&self, posts: Vec<Post>) -> Result<Vec<Post>> {
        self.check_write().await?;
        let mut store = self.posts.write().await;
        let mut created = Vec::with_capacity(posts.len());
        for mut post in posts {
            let id = post.id.get_or_insert_with(Self::generate_id).clone();
            store.insert(id, post.clone());
            created.push(post);
        }
        Ok(created)
    }

    async fn list_all(&self) -> Result<Vec<Post>> {
        self.check_read().await?;
        Ok(self.posts.read().await.values().cloned().collect())
    }
}
