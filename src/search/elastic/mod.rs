//! Elasticsearch implementation of the search index, over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{
    IndexedLike, IndexedPost, Leaderboard, LeaderboardRange, RefreshPolicy, Result, SearchConfig,
    SearchError, SearchIndex, LEADERBOARD_SIZE, LIKES_INDEX, POSTS_INDEX, SEARCH_WINDOW,
};

pub mod query;

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Elasticsearch search index client.
#[derive(Clone)]
pub struct ElasticSearchIndex {
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    refresh: RefreshPolicy,
    http: reqwest::Client,
}

impl ElasticSearchIndex {
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let trimmed = config.url.trim();
        if trimmed.is_empty() {
            return Err(SearchError::Config("search url is empty".to_string()));
        }

        let base_url = Url::parse(trimmed)
            .map_err(|e| SearchError::Config(format!("invalid search url {trimmed}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SearchError::Config(format!(
                "search url {trimmed} cannot carry a path"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            username: config.username.clone().filter(|u| !u.trim().is_empty()),
            password: config.password.clone(),
            refresh: config.refresh,
            http,
        })
    }

    async fn ensure_index(&self, index: &str, mappings: Value) -> Result<()> {
        let resp = self.request(Method::HEAD, &[index]).send().await?;
        if resp.status() != StatusCode::NOT_FOUND {
            return ensure_success(resp).await.map(drop);
        }

        let resp = self
            .request(Method::PUT, &[index])
            .json(&mappings)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            info!(index, "Created search index");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains(ALREADY_EXISTS) {
            debug!(index, "Search index created concurrently");
            return Ok(());
        }
        Err(SearchError::Store {
            status: status.as_u16(),
            body,
        })
    }

    async fn put_document<T: Serialize>(&self, index: &str, id: &str, document: &T) -> Result<()> {
        let resp = self
            .write_request(Method::PUT, &[index, "_doc", id])
            .json(document)
            .send()
            .await?;
        ensure_success(resp).await.map(drop)
    }

    async fn bulk(&self, body: String) -> Result<()> {
        if body.is_empty() {
            return Ok(());
        }

        let resp = self
            .write_request(Method::POST, &["_bulk"])
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;

        let summary: BulkResponse = serde_json::from_str(&text)?;
        if summary.errors {
            return Err(SearchError::Store { status, body: text });
        }
        Ok(())
    }

    async fn post_json<R: DeserializeOwned>(&self, path: &[&str], body: &Value) -> Result<R> {
        let resp = self.request(Method::POST, path).json(body).send().await?;
        decode(ensure_success(resp).await?).await
    }

    /// Request to the base url extended by `path`, one percent-encoded
    /// segment per element.
    fn request(&self, method: Method, path: &[&str]) -> reqwest::RequestBuilder {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        let builder = self.http.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    fn write_request(&self, method: Method, path: &[&str]) -> reqwest::RequestBuilder {
        let builder = self.request(method, path);
        match self.refresh.as_param() {
            Some(refresh) => builder.query(&[("refresh", refresh)]),
            None => builder,
        }
    }
}

impl ElasticSearchIndex {
    /// `_delete_by_query` for one post's likes. Version conflicts with a
    /// concurrent redelivery are skipped instead of aborting the delete.
    fn delete_likes_request(&self, post_id: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .request(Method::POST, &[LIKES_INDEX, "_delete_by_query"])
            .query(&[("conflicts", "proceed")]);
        // _delete_by_query only accepts a boolean refresh.
        if self.refresh != RefreshPolicy::Off {
            builder = builder.query(&[("refresh", "true")]);
        }
        builder.json(&query::likes_of_post(post_id))
    }
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
}

#[derive(Deserialize)]
struct GetResponse<T> {
    #[serde(rename = "_source")]
    source: Option<T>,
}

#[derive(Deserialize)]
struct SearchResponse<T> {
    hits: Hits<T>,
}

#[derive(Deserialize)]
struct Hits<T> {
    hits: Vec<Hit<T>>,
}

#[derive(Deserialize)]
struct Hit<T> {
    #[serde(rename = "_source")]
    source: T,
}

#[derive(Deserialize)]
struct AggregationResponse {
    aggregations: Aggregations,
}

#[derive(Deserialize)]
struct Aggregations {
    by_author: Buckets,
}

#[derive(Deserialize)]
struct Buckets {
    buckets: Vec<Bucket>,
}

#[derive(Deserialize)]
struct Bucket {
    key: i32,
    doc_count: u64,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct DeleteByQueryResponse {
    deleted: u64,
}

/// Pass successful responses through; turn anything else into
/// [`SearchError::Store`] carrying the store's diagnostic body.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SearchError::Store {
        status: status.as_u16(),
        body,
    })
}

async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R> {
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl SearchIndex for ElasticSearchIndex {
    async fn setup(&self) -> Result<()> {
        self.ensure_index(POSTS_INDEX, query::posts_mappings())
            .await?;
        self.ensure_index(LIKES_INDEX, query::likes_mappings())
            .await
    }

    async fn index_post(&self, post: &IndexedPost) -> Result<()> {
        self.put_document(POSTS_INDEX, &post.id, post).await
    }

    async fn index_like(&self, like: &IndexedLike, id: Option<&str>) -> Result<String> {
        if let Some(id) = id {
            self.put_document(LIKES_INDEX, id, like).await?;
            return Ok(id.to_string());
        }

        let resp = self
            .write_request(Method::POST, &[LIKES_INDEX, "_doc"])
            .json(like)
            .send()
            .await?;
        let created: IndexResponse = decode(ensure_success(resp).await?).await?;
        Ok(created.id)
    }

    async fn index_posts(&self, posts: &[IndexedPost]) -> Result<()> {
        let body = query::bulk_index(POSTS_INDEX, posts.iter().map(|p| (p.id.clone(), p)))?;
        self.bulk(body).await
    }

    async fn index_likes(&self, likes: &[IndexedLike]) -> Result<()> {
        let body = query::bulk_index(LIKES_INDEX, likes.iter().map(|l| (l.document_id(), l)))?;
        self.bulk(body).await
    }

    async fn search_posts(
        &self,
        title_term: &str,
        content_term: &str,
    ) -> Result<Vec<IndexedPost>> {
        let body = query::search(title_term, content_term, SEARCH_WINDOW);
        let found: SearchResponse<IndexedPost> = self
            .post_json(&[POSTS_INDEX, "_search"], &body)
            .await?;
        Ok(found.hits.hits.into_iter().map(|h| h.source).collect())
    }

    async fn analytics_leaderboard(&self, range: &LeaderboardRange) -> Result<Leaderboard> {
        let body = query::leaderboard(range, LEADERBOARD_SIZE);
        let found: AggregationResponse = self
            .post_json(&[LIKES_INDEX, "_search"], &body)
            .await?;
        Ok(found
            .aggregations
            .by_author
            .buckets
            .into_iter()
            .map(|b| (b.key, b.doc_count))
            .collect())
    }

    async fn delete_post(&self, id: &str) -> Result<()> {
        let resp = self
            .write_request(Method::DELETE, &[POSTS_INDEX, "_doc", id])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp).await.map(drop)
    }

    async fn get_post(&self, id: &str) -> Result<Option<IndexedPost>> {
        let resp = self
            .request(Method::GET, &[POSTS_INDEX, "_doc", id])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: GetResponse<IndexedPost> = decode(ensure_success(resp).await?).await?;
        Ok(found.source)
    }

    async fn delete_likes_for_post(&self, post_id: &str) -> Result<u64> {
        // Likes written with refresh off are not searchable until a refresh.
        let resp = self
            .request(Method::POST, &[LIKES_INDEX, "_refresh"])
            .send()
            .await?;
        ensure_success(resp).await?;

        let resp = self.delete_likes_request(post_id).send().await?;
        let deleted: DeleteByQueryResponse = decode(ensure_success(resp).await?).await?;
        Ok(deleted.deleted)
    }

    async fn count_likes_for_post(&self, post_id: &str) -> Result<u64> {
        let found: CountResponse = self
            .post_json(&[LIKES_INDEX, "_count"], &query::likes_of_post(post_id))
            .await?;
        Ok(found.count)
    }
}
