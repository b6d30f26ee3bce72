//! SearchIndex interface step definitions.

use std::collections::HashMap;

use cucumber::{given, then, when, World};
use postdex::search::{IndexedLike, IndexedPost, SearchIndex};

use super::parse_day;
use crate::backend::{SearchBackend, SearchContext};

/// Test context for SearchIndex scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct SearchIndexWorld {
    backend: SearchBackend,
    context: Option<SearchContext>,
    posts: HashMap<String, IndexedPost>,
    last_deleted: Option<u64>,
}

impl SearchIndexWorld {
    fn new() -> Self {
        Self {
            backend: SearchBackend::from_env(),
            context: None,
            posts: HashMap::new(),
            last_deleted: None,
        }
    }

    fn index(&self) -> &dyn SearchIndex {
        self.context
            .as_ref()
            .expect("Search context not initialized")
            .index
            .as_ref()
    }

    fn post(&self, id: &str) -> IndexedPost {
        self.posts
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("No post {id} in scenario"))
    }
}

// --- Background ---

#[given("a SearchIndex backend")]
async fn given_search_index_backend(world: &mut SearchIndexWorld) {
    println!("Using backend: {}", world.backend.name());
    world.context = Some(SearchContext::new(world.backend).await);
}

// --- Given steps ---

#[given(expr = "a post {string} by author {int} titled {string} with content {string} on {string}")]
async fn given_post(
    world: &mut SearchIndexWorld,
    id: String,
    author_id: i32,
    title: String,
    content: String,
    day: String,
) {
    world.posts.insert(
        id.clone(),
        IndexedPost {
            id,
            author_id,
            title,
            content,
            created_at: parse_day(&day),
        },
    );
}

// --- When steps ---

#[when(expr = "I index the post {string}")]
async fn when_index_post(world: &mut SearchIndexWorld, id: String) {
    let post = world.post(&id);
    world
        .index()
        .index_post(&post)
        .await
        .expect("Failed to index post");
}

#[when(expr = "the post {string} is retitled {string}")]
async fn when_retitle(world: &mut SearchIndexWorld, id: String, title: String) {
    if let Some(post) = world.posts.get_mut(&id) {
        post.title = title;
    }
}

#[when(
    regex = r#"^user (\d+) likes post "([^"]*)" by author (\d+) on "([^"]*)" with a (deterministic|store-assigned) id$"#
)]
async fn when_user_likes(
    world: &mut SearchIndexWorld,
    liked_by: i32,
    post_id: String,
    author_id: i32,
    day: String,
    strategy: String,
) {
    let like = IndexedLike {
        post_id,
        author_id,
        liked_by,
        created_at: parse_day(&day),
    };
    let id = (strategy == "deterministic").then(|| like.document_id());
    world
        .index()
        .index_like(&like, id.as_deref())
        .await
        .expect("Failed to index like");
}

#[when(expr = "I delete the post {string} and its likes")]
async fn when_delete_post(world: &mut SearchIndexWorld, id: String) {
    world
        .index()
        .delete_post(&id)
        .await
        .expect("Failed to delete post");
    let deleted = world
        .index()
        .delete_likes_for_post(&id)
        .await
        .expect("Failed to delete likes");
    world.last_deleted = Some(deleted);
}

// --- Then steps ---

#[then(expr = "the post {string} has title {string} and content {string}")]
async fn then_post_has_text(world: &mut SearchIndexWorld, id: String, title: String, content: String) {
    let post = world
        .index()
        .get_post(&id)
        .await
        .expect("Failed to get post")
        .expect("Post not found");
    assert_eq!(post.title, title);
    assert_eq!(post.content, content);
}

#[then(expr = "the post {string} has author {int} and was created on {string}")]
async fn then_post_has_author(world: &mut SearchIndexWorld, id: String, author_id: i32, day: String) {
    let post = world
        .index()
        .get_post(&id)
        .await
        .expect("Failed to get post")
        .expect("Post not found");
    assert_eq!(post.author_id, author_id);
    assert_eq!(post.created_at, parse_day(&day));
}

#[then(expr = "the post {string} is not found")]
async fn then_post_not_found(world: &mut SearchIndexWorld, id: String) {
    let post = world.index().get_post(&id).await.expect("Failed to get post");
    assert!(post.is_none(), "Expected {id} to be absent");
}

#[then(regex = r#"^searching title "([^"]*)" and content "([^"]*)" finds (\d+) posts?$"#)]
async fn then_search_count(world: &mut SearchIndexWorld, title: String, content: String, count: usize) {
    let hits = world
        .index()
        .search_posts(&title, &content)
        .await
        .expect("Search failed");
    assert_eq!(hits.len(), count);
}

#[then(expr = "searching title {string} and content {string} finds posts {string}")]
async fn then_search_ids(world: &mut SearchIndexWorld, title: String, content: String, ids: String) {
    let hits = world
        .index()
        .search_posts(&title, &content)
        .await
        .expect("Search failed");
    let found: Vec<String> = hits.into_iter().map(|p| p.id).collect();
    let expected: Vec<String> = ids.split(',').map(|s| s.trim().to_string()).collect();
    assert_eq!(found, expected);
}

#[then(regex = r#"^post "([^"]*)" has (\d+) indexed likes?$"#)]
async fn then_like_count(world: &mut SearchIndexWorld, post_id: String, count: u64) {
    let actual = world
        .index()
        .count_likes_for_post(&post_id)
        .await
        .expect("Failed to count likes");
    assert_eq!(actual, count);
}

#[then(expr = "{int} likes were deleted")]
async fn then_likes_deleted(world: &mut SearchIndexWorld, count: u64) {
    assert_eq!(world.last_deleted, Some(count));
}
