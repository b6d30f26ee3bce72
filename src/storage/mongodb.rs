//! MongoDB implementation of the content store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Post, PostStore, Result, StorageError};

/// Document shape of a post in the collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    author_id: i32,
    title: String,
    content: String,
    created_at: BsonDateTime,
    #[serde(default)]
    likes: Vec<i32>,
}

impl PostDocument {
    fn from_post(id: ObjectId, post: &Post) -> Self {
        Self {
            id,
            author_id: post.author_id,
            title: post.title.clone(),
            content: post.content.clone(),
            created_at: BsonDateTime::from_millis(post.created_at.timestamp_millis()),
            likes: post.likes().to_vec(),
        }
    }

    fn into_post(self) -> Result<Post> {
        let millis = self.created_at.timestamp_millis();
        let created_at = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or(StorageError::InvalidTimestamp(millis))?;

        Ok(Post::new(self.author_id, self.title, self.content, created_at)
            .with_id(self.id.to_hex())
            .with_likes(self.likes))
    }
}

/// Posts whose id is not a valid ObjectId cannot exist in the collection.
fn parse_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

fn into_posts(documents: Vec<PostDocument>) -> Result<Vec<Post>> {
    documents.into_iter().map(PostDocument::into_post).collect()
}

/// MongoDB implementation of PostStore.
pub struct MongoPostStore {
    posts: Collection<PostDocument>,
}

impl MongoPostStore {
    /// Create a store over `database.collection`.
    pub fn new(client: &Client, database_name: &str, collection_name: &str) -> Self {
        let posts = client.database(database_name).collection(collection_name);
        Self { posts }
    }
}

#[async_trait]
impl PostStore for MongoPostStore {
    async fn create(&self, mut post: Post) -> Result<Post> {
        let id = match post.id.as_deref() {
            Some(id) => parse_id(id).ok_or_else(|| StorageError::InvalidId(id.to_string()))?,
            None => ObjectId::new(),
        };

        let document = PostDocument::from_post(id, &post);
        let result = self
            .posts
            .replace_one(doc! { "_id": id }, &document)
            .upsert(true)
            .await?;

        debug!(
            post_id = %id,
            matched = result.matched_count,
            upserted = result.upserted_id.is_some(),
            "Upserted post"
        );

        post.id = Some(id.to_hex());
        Ok(post)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };

        self.posts
            .find_one(doc! { "_id": id })
            .await?
            .map(PostDocument::into_post)
            .transpose()
    }

    async fn get_by_author(&self, author_id: i32) -> Result<Vec<Post>> {
        let cursor = self.posts.find(doc! { "authorId": author_id }).await?;
        into_posts(cursor.try_collect().await?)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Post>> {
        let ids: Vec<ObjectId> = ids.iter().filter_map(|id| parse_id(id)).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let cursor = self.posts.find(doc! { "_id": { "$in": ids } }).await?;
        into_posts(cursor.try_collect().await?)
    }

    async fn delete(&self, post: &Post) -> Result<()> {
        let id = post
            .id
            .as_deref()
            .and_then(parse_id)
            .ok_or(StorageError::MissingId)?;

        self.posts.delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "authorId": 1 })
            .options(IndexOptions::builder().unique(false).build())
            .build();

        self.posts.create_index(index).await?;
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.posts.count_documents(doc! {}).await? == 0)
    }

    async fn create_many(&self, posts: Vec<Post>) -> Result<Vec<Post>> {
        if posts.is_empty() {
            return Ok(posts);
        }

        let mut created = Vec::with_capacity(posts.len());
        let mut documents = Vec::with_capacity(posts.len());
        for mut post in posts {
            let id = match post.id.as_deref() {
                Some(id) => parse_id(id).ok_or_else(|| StorageError::InvalidId(id.to_string()))?,
                None => ObjectId::new(),
            };
            documents.push(PostDocument::from_post(id, &post));
            post.id = Some(id.to_hex());
            created.push(post);
        }

        self.posts.insert_many(&documents).await?;
        Ok(created)
    }

    async fn list_all(&self) -> Result<Vec<Post>> {
        let cursor = self.posts.find(doc! {}).await?;
        into_posts(cursor.try_collect().await?)
    }
}
