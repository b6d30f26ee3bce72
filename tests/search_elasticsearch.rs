//! Elasticsearch search index integration tests.
//!
//! Run with: cargo test --test search_elasticsearch -- --ignored --nocapture
//!
//! Requires: ELASTICSEARCH_URL env var or Elasticsearch on localhost:9200
//! with security disabled. Tests write to the `posts` and `likes` indices
//! under unique ids and remove what they wrote.

use chrono::{NaiveDate, TimeZone, Utc};
use postdex::search::{
    init_search_index, IndexedLike, IndexedPost, LeaderboardRange, RefreshPolicy, SearchConfig,
    SearchIndex, SearchType,
};
use uuid::Uuid;

fn elasticsearch_url() -> String {
    std::env::var("ELASTICSEARCH_URL").unwrap_or_else(|_| "http://localhost:9200".to_string())
}

async fn index() -> std::sync::Arc<dyn SearchIndex> {
    println!("Connecting to: {}", elasticsearch_url());
    let config = SearchConfig {
        search_type: SearchType::Elasticsearch,
        url: elasticsearch_url(),
        refresh: RefreshPolicy::WaitFor,
        ..SearchConfig::default()
    };
    init_search_index(&config)
        .await
        .expect("Failed to initialize Elasticsearch index")
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires running Elasticsearch instance"]
async fn test_elasticsearch_post_round_trip_and_search() {
    let index = index().await;
    let id = unique("post");
    let marker = Uuid::new_v4().simple().to_string();

    let post = IndexedPost {
        id: id.clone(),
        author_id: 7,
        title: format!("title {marker}"),
        content: "body".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
    };
    index.index_post(&post).await.unwrap();
    index.index_post(&post).await.unwrap();

    let fetched = index.get_post(&id).await.unwrap().unwrap();
    assert_eq!(fetched, post);

    let hits = index.search_posts("nomatch", &marker).await.unwrap();
    assert!(hits.is_empty());
    let hits = index.search_posts(&marker, "nomatch").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);

    index.delete_post(&id).await.unwrap();
    assert!(index.get_post(&id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires running Elasticsearch instance"]
async fn test_elasticsearch_likes_and_leaderboard() {
    let index = index().await;
    let post_id = unique("post");
    // Far-future day so other data in the index stays out of the range.
    let day = NaiveDate::from_ymd_opt(2199, 1, 1).unwrap();
    let at = day.and_hms_opt(12, 0, 0).unwrap().and_utc();
    let author_id = 1_000_000 + (Uuid::new_v4().as_u128() % 1_000_000) as i32;

    let like = |liked_by| IndexedLike {
        post_id: post_id.clone(),
        author_id,
        liked_by,
        created_at: at,
    };

    for liked_by in [1, 2, 1] {
        let l = like(liked_by);
        index.index_like(&l, Some(&l.document_id())).await.unwrap();
    }
    assert_eq!(index.count_likes_for_post(&post_id).await.unwrap(), 2);

    let board = index
        .analytics_leaderboard(&LeaderboardRange::between(day, day))
        .await
        .unwrap();
    assert_eq!(board.get(&author_id), Some(&2));

    let assigned = index.index_like(&like(3), None).await.unwrap();
    assert!(!assigned.is_empty());
    assert_eq!(index.count_likes_for_post(&post_id).await.unwrap(), 3);

    assert_eq!(index.delete_likes_for_post(&post_id).await.unwrap(), 3);
    assert_eq!(index.count_likes_for_post(&post_id).await.unwrap(), 0);
}
