use crate::model::SearchResultRecord;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to decode search response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("Failed to spawn clone command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Clone of {url} exited with {status}")]
    Failed { url: String, status: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters of a single search page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub sort: String,
    pub order: String,
    pub per_page: u32,
    pub page: u32,
}

/// One successful page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<SearchResultRecord>,
    /// Whether the pagination links carry a `next` relation.
    pub has_next: bool,
    pub total_count: Option<u64>,
    pub rate_limit_remaining: Option<u32>,
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetches one page. Any non-success status is an error.
    async fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, SearchError>;
}

#[async_trait]
pub trait RepoCloner: Send + Sync {
    /// Clones `url` into `dest`. `dest` must not exist or must be empty.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CloneError>;
}
