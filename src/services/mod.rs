//! Application services composing the stores, the bus and the search index.

pub mod posts;
pub mod reindex;

pub use posts::{PostService, ServiceError};
pub use reindex::{ReindexError, ReindexSummary, Reindexer};
