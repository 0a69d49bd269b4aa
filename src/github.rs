//! GitHub repository search client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::HttpConfig;
use crate::model::SearchResultRecord;
use crate::traits::{SearchApi, SearchError, SearchPage, SearchRequest};

pub const DEFAULT_SEARCH_URL: &str = "https://api.github.com/search/repositories";

const GITHUB_JSON: &str = "application/vnd.github+json";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    items: Vec<SearchResultRecord>,
}

/// [`SearchApi`] implementation over the GitHub REST search endpoint.
pub struct GitHubSearchClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl GitHubSearchClient {
    pub fn new(endpoint: impl Into<String>, config: &HttpConfig) -> Result<Self, SearchError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| SearchError::Transport(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl SearchApi for GitHubSearchClient {
    async fn search_page(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        let mut builder = self
            .http
            .get(&self.endpoint)
            .header(ACCEPT, GITHUB_JSON)
            .query(&[
                ("q", request.query.clone()),
                ("sort", request.sort.clone()),
                ("order", request.order.clone()),
                ("per_page", request.per_page.to_string()),
                ("page", request.page.to_string()),
            ]);

        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let has_next = has_next_link(response.headers());
        let rate_limit_remaining = response
            .headers()
            .get(RATE_LIMIT_REMAINING)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        if let Some(remaining) = rate_limit_remaining {
            debug!(remaining, "Search rate limit remaining");
        }

        let body: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        Ok(SearchPage {
            items: body.items,
            has_next,
            total_count: body.total_count,
            rate_limit_remaining,
        })
    }
}

fn has_next_link(headers: &HeaderMap) -> bool {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| parse_link_header(v).iter().any(|(rel, _)| rel == "next"))
}

/// Parses an RFC 8288 `Link` header into `(rel, url)` pairs.
///
/// A link carrying several space-separated relations yields one pair per
/// relation.
pub fn parse_link_header(value: &str) -> Vec<(String, String)> {
    let mut links = Vec::new();

    for part in value.split(',') {
        let mut segments = part.split(';');
        let target = match segments.next() {
            Some(target) => target.trim(),
            None => continue,
        };
        let url = match target.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            Some(url) => url,
            None => continue,
        };

        for param in segments {
            let param = param.trim();
            if let Some(rel) = param.strip_prefix("rel=") {
                for name in rel.trim_matches('"').split_whitespace() {
                    links.push((name.to_ascii_lowercase(), url.to_string()));
                }
            }
        }
    }

    links
}
