use chrono::{DateTime, NaiveDate, Utc};

use super::*;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

fn at(d: u32) -> DateTime<Utc> {
    day(d).and_hms_opt(12, 0, 0).unwrap().and_utc()
}

fn post(id: &str, author_id: i32, title: &str, content: &str) -> IndexedPost {
    IndexedPost {
        id: id.to_string(),
        author_id,
        title: title.to_string(),
        content: content.to_string(),
        created_at: at(1),
    }
}

fn like(post_id: &str, author_id: i32, liked_by: i32, d: u32) -> IndexedLike {
    IndexedLike {
        post_id: post_id.to_string(),
        author_id,
        liked_by,
        created_at: at(d),
    }
}

async fn index_deterministic(index: &MemorySearchIndex, like: IndexedLike) {
    let id = like.document_id();
    index.index_like(&like, Some(&id)).await.unwrap();
}

#[tokio::test]
async fn test_index_then_get_post() {
    let index = MemorySearchIndex::new();
    let p = post("p1", 7, "hello", "world");
    index.index_post(&p).await.unwrap();

    assert_eq!(index.get_post("p1").await.unwrap(), Some(p));
    assert!(index.get_post("p2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_index_post_twice_keeps_one_document() {
    let index = MemorySearchIndex::new();
    let p = post("p1", 7, "hello", "world");
    index.index_post(&p).await.unwrap();
    index.index_post(&p).await.unwrap();

    assert_eq!(index.post_count().await, 1);
}

#[tokio::test]
async fn test_store_assigned_like_ids_duplicate() {
    let index = MemorySearchIndex::new();
    let l = like("p1", 7, 1, 1);

    let first = index.index_like(&l, None).await.unwrap();
    let second = index.index_like(&l, None).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(index.count_likes_for_post("p1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_deterministic_like_ids_overwrite() {
    let index = MemorySearchIndex::new();
    index_deterministic(&index, like("p1", 7, 1, 1)).await;
    index_deterministic(&index, like("p1", 7, 1, 1)).await;

    assert_eq!(index.count_likes_for_post("p1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_leaderboard_counts_per_author() {
    let index = MemorySearchIndex::new();
    index_deterministic(&index, like("p1", 7, 1, 1)).await;
    index_deterministic(&index, like("p1", 7, 2, 1)).await;
    index_deterministic(&index, like("p2", 9, 1, 1)).await;

    let board = index
        .analytics_leaderboard(&LeaderboardRange::all())
        .await
        .unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[&7], 2);
    assert_eq!(board[&9], 1);
}

#[tokio::test]
async fn test_leaderboard_date_range_is_inclusive() {
    let index = MemorySearchIndex::new();
    index_deterministic(&index, like("p1", 7, 1, 9)).await;
    index_deterministic(&index, like("p1", 7, 2, 10)).await;
    index_deterministic(&index, like("p1", 7, 3, 12)).await;
    index_deterministic(&index, like("p1", 7, 4, 13)).await;

    let board = index
        .analytics_leaderboard(&LeaderboardRange::between(day(10), day(12)))
        .await
        .unwrap();
    assert_eq!(board[&7], 2);
}

#[tokio::test]
async fn test_leaderboard_is_capped() {
    let index = MemorySearchIndex::new();
    for author in 1..=7 {
        for liker in 0..author {
            index_deterministic(&index, like(&format!("p{author}"), author, liker, 1)).await;
        }
    }

    let board = index
        .analytics_leaderboard(&LeaderboardRange::all())
        .await
        .unwrap();
    assert_eq!(board.len(), LEADERBOARD_SIZE);
    assert!(!board.contains_key(&1));
    assert!(!board.contains_key(&2));
}

#[tokio::test]
async fn test_leaderboard_ties_keep_lower_author_ids() {
    let index = MemorySearchIndex::new();
    for author in [12, 3, 8, 5, 1, 20] {
        index_deterministic(&index, like(&format!("p{author}"), author, 1, 1)).await;
    }

    let board = index
        .analytics_leaderboard(&LeaderboardRange::all())
        .await
        .unwrap();
    let authors: Vec<i32> = board.keys().copied().collect();
    assert_eq!(authors, vec![1, 3, 5, 8, 12]);
}

#[tokio::test]
async fn test_search_is_or_across_fields() {
    let index = MemorySearchIndex::new();
    index
        .index_post(&post("p1", 7, "alpha", "beta"))
        .await
        .unwrap();

    let hits = index.search_posts("gamma", "beta").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "p1");

    assert!(index.search_posts("gamma", "delta").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_ranks_better_matches_first() {
    let index = MemorySearchIndex::new();
    index
        .index_post(&post("a", 1, "rust", "nothing here"))
        .await
        .unwrap();
    index
        .index_post(&post("b", 1, "rust async", "async rust"))
        .await
        .unwrap();

    let hits = index.search_posts("rust async", "rust async").await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
}

#[tokio::test]
async fn test_search_returns_at_most_window() {
    let index = MemorySearchIndex::new();
    for i in 0..15 {
        index
            .index_post(&post(&format!("p{i:02}"), 1, "common", "text"))
            .await
            .unwrap();
    }

    let hits = index.search_posts("common", "common").await.unwrap();
    assert_eq!(hits.len(), SEARCH_WINDOW);
}

#[tokio::test]
async fn test_delete_post_and_likes() {
    let index = MemorySearchIndex::new();
    index.index_post(&post("p1", 7, "t", "c")).await.unwrap();
    index_deterministic(&index, like("p1", 7, 1, 1)).await;
    index_deterministic(&index, like("p1", 7, 2, 1)).await;
    index_deterministic(&index, like("p2", 7, 1, 1)).await;

    index.delete_post("p1").await.unwrap();
    index.delete_post("missing").await.unwrap();
    assert!(index.get_post("p1").await.unwrap().is_none());

    assert_eq!(index.delete_likes_for_post("p1").await.unwrap(), 2);
    assert_eq!(index.like_count().await, 1);
}

#[tokio::test]
async fn test_bulk_likes_use_deterministic_ids() {
    let index = MemorySearchIndex::new();
    let likes = vec![like("p1", 7, 1, 1), like("p1", 7, 1, 1), like("p1", 7, 2, 1)];
    index.index_likes(&likes).await.unwrap();
    index.index_likes(&likes).await.unwrap();

    assert_eq!(index.count_likes_for_post("p1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_fail_on_write() {
    let index = MemorySearchIndex::new();
    index.set_fail_on_write(true).await;

    let result = index.index_post(&post("p1", 7, "t", "c")).await;
    assert!(matches!(result, Err(SearchError::Unavailable(_))));
}
