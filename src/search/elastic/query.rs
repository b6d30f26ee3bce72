//! Request bodies for the Elasticsearch REST API.

use serde::Serialize;
use serde_json::{json, Value};

use crate::search::LeaderboardRange;

/// Name of the terms aggregation in leaderboard requests.
pub const LEADERBOARD_AGG: &str = "by_author";

const DAY_FORMAT: &str = "yyyy-MM-dd";

/// Explicit mappings for the `posts` index.
pub fn posts_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "authorId": { "type": "integer" },
                "title": { "type": "text" },
                "content": { "type": "text" },
                "createdAt": { "type": "date" }
            }
        }
    })
}

/// Explicit mappings for the `likes` index.
pub fn likes_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "postId": { "type": "keyword" },
                "authorId": { "type": "integer" },
                "likedBy": { "type": "integer" },
                "createdAt": { "type": "date" }
            }
        }
    })
}

/// Title OR content match, best first.
pub fn search(title_term: &str, content_term: &str, size: usize) -> Value {
    json!({
        "from": 0,
        "size": size,
        "query": {
            "bool": {
                "should": [
                    { "match": { "title": title_term } },
                    { "match": { "content": content_term } }
                ],
                "minimum_should_match": 1
            }
        }
    })
}

/// Like counts per author. Buckets come back count descending, then
/// author id ascending.
///
/// Both bounds are rounded to whole days so the end day is included.
pub fn leaderboard(range: &LeaderboardRange, size: usize) -> Value {
    let query = match range.day_bounds() {
        Some((start, end)) => json!({
            "range": {
                "createdAt": {
                    "gte": format!("{}||/d", start.format("%Y-%m-%d")),
                    "lte": format!("{}||/d", end.format("%Y-%m-%d")),
                    "format": DAY_FORMAT
                }
            }
        }),
        None => json!({ "match_all": {} }),
    };

    json!({
        "size": 0,
        "query": query,
        "aggs": {
            LEADERBOARD_AGG: {
                "terms": {
                    "field": "authorId",
                    "size": size,
                    "order": [ { "_count": "desc" }, { "_key": "asc" } ]
                }
            }
        }
    })
}

/// Exact match on a like's post id.
pub fn likes_of_post(post_id: &str) -> Value {
    json!({ "query": { "term": { "postId": post_id } } })
}

/// NDJSON body for `_bulk`, one index action per document.
pub fn bulk_index<'a, T, I>(index: &str, documents: I) -> serde_json::Result<String>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (String, &'a T)>,
{
    let mut body = String::new();
    for (id, document) in documents {
        let action = json!({ "index": { "_index": index, "_id": id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}
